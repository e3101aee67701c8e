use crate::cache::{Cache, CacheLevel, Level, ServedBy};
use crate::config::{HierarchyConfig, LevelConfig};
use crate::error::SimError;

fn level(size: usize, block_size: usize, associativity: usize) -> LevelConfig {
    LevelConfig {
        size,
        block_size,
        associativity,
        latency: 1,
    }
}

#[test]
fn default_l1_geometry() {
    let l1: CacheLevel = CacheLevel::new("L1", &LevelConfig::default_l1()).unwrap();
    let geometry = l1.geometry();
    assert_eq!(geometry.num_sets, 32);
    assert_eq!(geometry.offset_bits, 5);
    assert_eq!(geometry.index_bits, 5);
    assert_eq!(geometry.tag_bits, 22);
    assert_eq!(l1.address_to_set_and_tag(0x1234_5678), (19, 0x48D15));
}

#[test]
fn fully_associative_level_has_no_index_bits() {
    let full: CacheLevel = CacheLevel::new("full", &level(128, 32, 4)).unwrap();
    assert_eq!(full.geometry().num_sets, 1);
    assert_eq!(full.geometry().index_bits, 0);
    assert_eq!(full.address_to_set_and_tag(0xFFFF_FFE0), (0, 0x07FF_FFFF));
}

#[test]
fn rejects_bad_geometry() {
    let bad = [
        level(0, 32, 1),
        level(1024, 0, 1),
        level(1024, 32, 0),
        level(1024, 24, 1),
        // 3 sets
        level(96, 32, 1),
        // Not a whole number of sets
        level(100, 32, 1),
    ];
    for config in bad {
        let result: Result<CacheLevel, _> = CacheLevel::new("bad", &config);
        assert!(matches!(result, Err(SimError::InvalidConfiguration(_))), "{config:?}");
    }
    // Associativity itself doesn't need to be a power of two
    let three_way: CacheLevel = CacheLevel::new("3way", &level(96, 32, 3)).unwrap();
    assert_eq!(three_way.geometry().num_sets, 1);
}

#[test]
fn access_never_installs() {
    let mut l1: CacheLevel = CacheLevel::new("L1", &level(64, 32, 2)).unwrap();
    assert!(!l1.access(0x40));
    assert!(!l1.access(0x40));
    assert!(l1.set_lines(0).iter().all(|line| !line.valid));
    l1.install(0x40);
    assert!(l1.access(0x40));
    // Same block, different offset
    assert!(l1.access(0x5F));
    let stats = l1.stats();
    assert_eq!((stats.hits, stats.misses), (2, 2));
    assert_eq!(stats.hit_rate, 50.0);
}

#[test]
fn two_way_fifo_evicts_oldest() {
    let mut set: CacheLevel = CacheLevel::new("L1", &level(64, 32, 2)).unwrap();
    for address in [0x00, 0x20, 0x40] {
        assert!(!set.access(address));
        set.install(address);
    }
    assert!(set.access(0x20));
    assert!(!set.access(0x00));
}

#[test]
fn hits_do_not_protect_a_line() {
    let mut set: CacheLevel = CacheLevel::new("L1", &level(64, 32, 2)).unwrap();
    assert_eq!(set.install(0x00), None);
    assert_eq!(set.install(0x20), None);
    assert!(set.access(0x00));
    // 0x00 was installed first, so it goes first regardless of the hit
    assert_eq!(set.install(0x40), Some(0));
    assert!(!set.access(0x00));
    assert!(set.access(0x20));
    assert_eq!(set.install(0x60), Some(1));
}

#[test]
fn sets_are_independent() {
    let mut l1: CacheLevel = CacheLevel::new("L1", &LevelConfig::default_l1()).unwrap();
    l1.install(0x00);
    l1.install(0x20);
    assert!(l1.access(0x00));
    assert!(l1.access(0x20));
    // 0x400 maps to set 0 and replaces 0x00 in the direct mapped level
    assert_eq!(l1.install(0x400), Some(0));
    assert!(!l1.access(0x00));
    assert!(l1.access(0x20));
}

#[test]
fn empty_stats_are_zero() {
    let cache = Cache::new(&HierarchyConfig::default()).unwrap();
    let stats = cache.stats();
    assert_eq!(stats.total_requests, 0);
    assert_eq!(stats.amat, 0.0);
    assert_eq!(stats.l1.hit_rate, 0.0);
    assert_eq!(stats.l1.name, "L1");
    assert_eq!(stats.l2.name, "L2");
}

#[test]
fn amat_of_full_miss_then_hit() {
    let mut cache = Cache::new(&HierarchyConfig::default()).unwrap();
    let miss = cache.access(0x100, false);
    assert_eq!(miss.served_by, ServedBy::Memory);
    assert_eq!(miss.cycles, 111);
    let hit = cache.access(0x100, false);
    assert_eq!(hit.served_by, ServedBy::L1);
    assert_eq!(hit.cycles, 1);

    let stats = cache.stats();
    assert_eq!(stats.total_requests, 2);
    assert_eq!(stats.total_cycles, 112);
    assert_eq!(stats.amat, 56.0);
    assert_eq!((stats.l1.hits, stats.l1.misses), (1, 1));
    assert_eq!((stats.l2.hits, stats.l2.misses), (0, 1));
}

#[test]
fn l2_hit_promotes_into_l1() {
    let mut cache = Cache::new(&HierarchyConfig::default()).unwrap();
    // 0x000 and 0x400 share an L1 set but not an L2 set
    assert_eq!(cache.access(0x000, false).served_by, ServedBy::Memory);
    assert_eq!(cache.access(0x400, false).served_by, ServedBy::Memory);
    let outcome = cache.access(0x000, false);
    assert_eq!(outcome.served_by, ServedBy::L2);
    assert_eq!(outcome.cycles, 11);
    assert_eq!(cache.access(0x000, false).served_by, ServedBy::L1);
    assert_eq!(cache.stats().total_cycles, 111 + 111 + 11 + 1);
}

#[test]
fn writes_behave_like_reads() {
    let mut reads = Cache::new(&HierarchyConfig::default()).unwrap();
    let mut writes = Cache::new(&HierarchyConfig::default()).unwrap();
    for address in [0x0, 0x400, 0x0, 0x800, 0x20, 0x0] {
        assert_eq!(reads.access(address, false), writes.access(address, true));
    }
    assert_eq!(reads.stats(), writes.stats());
}

#[test]
fn reconfigure_resets_only_the_named_level() {
    let mut cache = Cache::new(&HierarchyConfig::default()).unwrap();
    cache.access(0x10, false);
    cache.access(0x10, false);
    cache.reconfigure(Level::L1, 2048, 64, 2).unwrap();

    let geometry = cache.l1().geometry();
    assert_eq!((geometry.size, geometry.block_size, geometry.associativity), (2048, 64, 2));
    assert_eq!(geometry.num_sets, 16);

    let stats = cache.stats();
    assert_eq!((stats.l1.hits, stats.l1.misses), (0, 0));
    assert_eq!(stats.l2.misses, 1);
    assert_eq!(stats.total_requests, 2);
    assert_eq!(stats.total_cycles, 112);

    // The rebuilt L1 is cold, the line is still in L2
    assert_eq!(cache.access(0x10, false).served_by, ServedBy::L2);
}

#[test]
fn reconfigure_keeps_configured_latency() {
    let mut config = HierarchyConfig::default();
    config.l1.latency = 3;
    config.l2.latency = 12;
    let mut cache = Cache::new(&config).unwrap();
    cache.reconfigure(Level::L2, 8192, 64, 4).unwrap();
    cache.reconfigure(Level::L1, 512, 16, 1).unwrap();
    assert_eq!(cache.l2().latency(), 12);
    assert_eq!(cache.l1().latency(), 3);
    assert_eq!(cache.access(0x40, false).cycles, 3 + 12 + 100);
}

#[cfg(target_pointer_width = "64")]
#[test]
fn unallocatable_geometry_is_rejected() {
    let mut cache = Cache::new(&HierarchyConfig::default()).unwrap();
    cache.access(0x10, false);
    let before = cache.stats();
    // One set of 2^62 one byte ways
    let err = cache.reconfigure(Level::L1, 1 << 62, 1, 1 << 62).unwrap_err();
    assert!(matches!(err, SimError::InvalidConfiguration(_)));
    assert_eq!(cache.l1().geometry().size, 1024);
    assert_eq!(cache.stats(), before);
    assert_eq!(cache.access(0x10, false).served_by, ServedBy::L1);
}

#[test]
fn rejected_reconfigure_keeps_the_old_level() {
    let mut cache = Cache::new(&HierarchyConfig::default()).unwrap();
    cache.access(0x10, false);
    let before = cache.stats();
    assert!(cache.reconfigure(Level::L2, 4096, 48, 2).is_err());
    assert_eq!(cache.l2().geometry().block_size, 32);
    assert_eq!(cache.stats(), before);
    assert_eq!(cache.access(0x10, false).served_by, ServedBy::L1);
}

#[test]
fn level_numbers() {
    assert_eq!(Level::try_from(1u8).unwrap(), Level::L1);
    assert_eq!(Level::try_from(2u8).unwrap(), Level::L2);
    assert!(matches!(Level::try_from(3u8), Err(SimError::InvalidConfiguration(_))));
}
