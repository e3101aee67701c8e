use std::io::{self, BufRead, Write};
use std::str::FromStr;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use memlib::allocator::{AllocationStrategy, BlockId, BlockState, MemoryBlock};
use memlib::cache::{CacheStats, LevelGeometry};
use memlib::{Level, Session};

lazy_static! {
    static ref HEX_ADDRESS: Regex = Regex::new(r"^(?:0[xX])?([0-9a-fA-F]{1,8})$").unwrap();
}

const INIT_USAGE: &str = "Usage: init <size> [alignment]";
const SET_USAGE: &str = "Usage: set allocator <first_fit|best_fit|worst_fit>";
const MODE_USAGE: &str = "Unknown mode. Use: first_fit, best_fit, worst_fit";
const MALLOC_USAGE: &str = "Usage: malloc <size>";
const FREE_USAGE: &str = "Usage: free <id>";
const READ_USAGE: &str = "Usage: read <hex_addr>";
const WRITE_USAGE: &str = "Usage: write <hex_addr>";
const PEEK_USAGE: &str = "Usage: peek <hex_addr>";
const POKE_USAGE: &str = "Usage: poke <hex_addr> <byte>";
const CACHE_CONFIG_USAGE: &str = "Usage: cache_config <1|2> <size> <block_size> <assoc>";

const HELP: &str = "Available Commands:
  init <size> [alignment]  Initialize physical memory with <size> bytes
  set allocator <mode>     Set allocation strategy (first_fit, best_fit, worst_fit)
  malloc <size>            Allocate <size> bytes of physical memory
  free <id>                Free the memory block with ID <id>
  dump                     Display the current physical memory map
  stats                    Show physical memory fragmentation statistics
  read <hex_addr>          Simulate a CPU read at <hex_addr>
  write <hex_addr>         Simulate a CPU write at <hex_addr>
  peek <hex_addr>          Show the byte stored in physical memory at <hex_addr>
  poke <hex_addr> <byte>   Store <byte> (0-255) in physical memory at <hex_addr>
  cache_stats              Show cache hit/miss and AMAT statistics
  cache_config <l> <s> <b> <a>  Configure cache level <l> (1 or 2) with size <s>,
                                block size <b>, and associativity <a>
  exit / quit              Exit the simulator";

/// A single shell command, already parsed and range checked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Init { size: usize, alignment: Option<usize> },
    SetAllocator(AllocationStrategy),
    Malloc(usize),
    Free(BlockId),
    Dump,
    Stats,
    Read(u32),
    Write(u32),
    Peek(u32),
    Poke { address: u32, value: u8 },
    CacheStats,
    CacheConfig { level: Level, size: usize, block_size: usize, associativity: usize },
    Help,
    Exit,
}

impl Command {
    /// Parses one input line. Blank lines give `None`, anything unusable gives the message to
    /// show the user
    ///
    /// Trailing arguments beyond the ones a command needs are ignored
    pub fn parse(line: &str) -> Result<Option<Command>, String> {
        let mut tokens = line.split_whitespace();
        let Some(verb) = tokens.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = tokens.collect();
        let command = match (verb, args.as_slice()) {
            ("exit" | "quit", _) => Command::Exit,
            ("help", _) => Command::Help,
            ("init", [size]) => Command::Init {
                size: number(size, INIT_USAGE)?,
                alignment: None,
            },
            ("init", [size, alignment, ..]) => Command::Init {
                size: number(size, INIT_USAGE)?,
                alignment: Some(number(alignment, INIT_USAGE)?),
            },
            ("init", _) => return Err(INIT_USAGE.to_string()),
            ("set", ["allocator", mode, ..]) => {
                Command::SetAllocator(mode.parse().map_err(|_| MODE_USAGE.to_string())?)
            }
            ("set", _) => return Err(SET_USAGE.to_string()),
            ("malloc", [size, ..]) => Command::Malloc(number(size, MALLOC_USAGE)?),
            ("malloc", _) => return Err(MALLOC_USAGE.to_string()),
            ("free", [id, ..]) => Command::Free(number(id, FREE_USAGE)?),
            ("free", _) => return Err(FREE_USAGE.to_string()),
            ("dump", _) => Command::Dump,
            ("stats", _) => Command::Stats,
            ("read", [address, ..]) => Command::Read(hex_address(address).ok_or(READ_USAGE)?),
            ("read", _) => return Err(READ_USAGE.to_string()),
            ("write", [address, ..]) => Command::Write(hex_address(address).ok_or(WRITE_USAGE)?),
            ("write", _) => return Err(WRITE_USAGE.to_string()),
            ("peek", [address, ..]) => Command::Peek(hex_address(address).ok_or(PEEK_USAGE)?),
            ("peek", _) => return Err(PEEK_USAGE.to_string()),
            ("poke", [address, value, ..]) => Command::Poke {
                address: hex_address(address).ok_or(POKE_USAGE)?,
                value: number(value, POKE_USAGE)?,
            },
            ("poke", _) => return Err(POKE_USAGE.to_string()),
            ("cache_stats", _) => Command::CacheStats,
            ("cache_config", [level, size, block_size, associativity, ..]) => Command::CacheConfig {
                level: Level::try_from(number::<u8>(level, CACHE_CONFIG_USAGE)?).map_err(|e| e.to_string())?,
                size: number(size, CACHE_CONFIG_USAGE)?,
                block_size: number(block_size, CACHE_CONFIG_USAGE)?,
                associativity: number(associativity, CACHE_CONFIG_USAGE)?,
            },
            ("cache_config", _) => return Err(CACHE_CONFIG_USAGE.to_string()),
            _ => return Err("Unknown command.".to_string()),
        };
        Ok(Some(command))
    }
}

fn number<T: FromStr>(text: &str, usage: &str) -> Result<T, String> {
    text.parse().map_err(|_| usage.to_string())
}

fn hex_address(text: &str) -> Option<u32> {
    let digits = HEX_ADDRESS.captures(text)?.get(1)?.as_str();
    u32::from_str_radix(digits, 16).ok()
}

/// Whether the command loop should keep reading
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// How input lines are presented
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Echo {
    /// Print a prompt before reading each line, for a terminal
    Prompt,
    /// Print each line after the prompt, so replayed scripts read like a session
    Script,
}

/// The interactive front end over one simulation session
pub struct Shell {
    session: Session,
    json: bool,
}

impl Shell {
    pub fn new(session: Session, json: bool) -> Self {
        Self { session, json }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Reads and executes commands until the input ends or an exit command is seen
    pub fn run(&mut self, input: impl BufRead, out: &mut impl Write, echo: Echo) -> io::Result<()> {
        if echo == Echo::Prompt {
            write!(out, "$ ")?;
            out.flush()?;
        }
        for line in input.lines() {
            let line = line?;
            if echo == Echo::Script {
                writeln!(out, "$ {line}")?;
            }
            let flow = match Command::parse(&line) {
                Ok(Some(command)) => self.execute(command, out)?,
                Ok(None) => Flow::Continue,
                Err(message) => {
                    writeln!(out, "{message}")?;
                    Flow::Continue
                }
            };
            if flow == Flow::Exit {
                break;
            }
            if echo == Echo::Prompt {
                write!(out, "$ ")?;
                out.flush()?;
            }
        }
        Ok(())
    }

    /// Runs one command against the session. Simulator errors are reported, never returned
    pub fn execute(&mut self, command: Command, out: &mut impl Write) -> io::Result<Flow> {
        let memory = &mut self.session.memory;
        let cache = &mut self.session.cache;
        match command {
            Command::Exit => return Ok(Flow::Exit),
            Command::Help => writeln!(out, "{HELP}")?,
            Command::Init { size, alignment } => {
                let alignment = alignment.unwrap_or(memory.alignment());
                match memory.reset(size, alignment) {
                    Ok(()) => writeln!(out, "[RAM] Initialized: {size} bytes.")?,
                    Err(e) => writeln!(out, "Error: {e}")?,
                }
            }
            Command::SetAllocator(strategy) => {
                memory.set_strategy(strategy);
                writeln!(out, "Allocator set to: {strategy}")?;
            }
            Command::Malloc(size) => match memory.allocate(size) {
                Ok(allocation) => writeln!(
                    out,
                    "Allocated block id={} at address=0x{:X}",
                    allocation.id, allocation.address
                )?,
                Err(e) => writeln!(out, "Error: {e}")?,
            },
            Command::Free(id) => match memory.free(id) {
                Ok(report) => {
                    write!(out, "Block {id} freed")?;
                    if report.merged_next {
                        write!(out, " (merged next)")?;
                    }
                    if report.merged_prev {
                        write!(out, " (merged prev)")?;
                    }
                    writeln!(out)?;
                }
                Err(e) => writeln!(out, "Error: {e}")?,
            },
            Command::Dump if self.json => write_json(out, &memory.dump())?,
            Command::Dump => {
                writeln!(out, "\n--- Memory Dump ---")?;
                for block in memory.dump() {
                    write_block(out, block)?;
                }
                writeln!(out, "-------------------")?;
            }
            Command::Stats if self.json => write_json(out, &memory.stats())?,
            Command::Stats => {
                let stats = memory.stats();
                writeln!(out, "Total memory:           {}", stats.total_bytes)?;
                writeln!(out, "Used memory:            {}", stats.used_bytes)?;
                writeln!(out, "Free memory:            {}", stats.free_bytes)?;
                writeln!(out, "Internal fragmentation: {} bytes", stats.internal_fragmentation)?;
                writeln!(out, "External fragmentation: {:.1}%", stats.external_fragmentation_percent)?;
                writeln!(
                    out,
                    "Allocation requests:    {} ({} successful)",
                    stats.allocation_requests, stats.successful_allocations
                )?;
            }
            Command::Read(address) | Command::Write(address) => {
                let is_write = matches!(command, Command::Write(_));
                let outcome = cache.access(address, is_write);
                let kind = if is_write { "write" } else { "read" };
                writeln!(out, "{kind} 0x{address:08X}: {:?} ({} cycles)", outcome.served_by, outcome.cycles)?;
            }
            // Byte access goes straight to physical memory, the cache only models timing
            Command::Peek(address) => match memory.read_byte(address as usize) {
                Ok(value) => writeln!(out, "[RAM] 0x{address:08X} = 0x{value:02X}")?,
                Err(e) => writeln!(out, "Error: {e}")?,
            },
            Command::Poke { address, value } => match memory.write_byte(address as usize, value) {
                Ok(()) => writeln!(out, "[RAM] 0x{address:08X} <- 0x{value:02X}")?,
                Err(e) => writeln!(out, "Error: {e}")?,
            },
            Command::CacheStats if self.json => write_json(out, &cache.stats())?,
            Command::CacheStats => write_cache_stats(out, &cache.stats())?,
            Command::CacheConfig { level, size, block_size, associativity } => {
                match cache.reconfigure(level, size, block_size, associativity) {
                    Ok(()) => {
                        let rebuilt = match level {
                            Level::L1 => cache.l1(),
                            Level::L2 => cache.l2(),
                        };
                        write_geometry(out, rebuilt.geometry())?;
                    }
                    Err(e) => writeln!(out, "Error: {e}")?,
                }
            }
        }
        Ok(Flow::Continue)
    }
}

fn write_json(out: &mut impl Write, value: &impl Serialize) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)
}

fn write_block(out: &mut impl Write, block: &MemoryBlock) -> io::Result<()> {
    write!(out, "[0x{:04X} - 0x{:04X}] ", block.start_address, block.end_address() - 1)?;
    match block.state {
        BlockState::Free => writeln!(out, "FREE ({} bytes)", block.size),
        BlockState::Used { id, padding } => {
            writeln!(out, "USED (id={id}, size={}, pad={padding})", block.size)
        }
    }
}

pub fn write_geometry(out: &mut impl Write, geometry: &LevelGeometry) -> io::Result<()> {
    writeln!(
        out,
        "[{}] Init: {}B, Block: {}B, Assoc: {} (Latency: {} cycles)",
        geometry.name, geometry.size, geometry.block_size, geometry.associativity, geometry.latency
    )
}

fn write_cache_stats(out: &mut impl Write, stats: &CacheStats) -> io::Result<()> {
    writeln!(out, "\n--- Cache Statistics ---")?;
    for level in [&stats.l1, &stats.l2] {
        writeln!(
            out,
            "{} Stats: Hits={} Misses={} Rate={:.2}%",
            level.name, level.hits, level.misses, level.hit_rate
        )?;
    }
    writeln!(out, "--- Performance Metrics ---")?;
    writeln!(out, "Total Requests: {}", stats.total_requests)?;
    writeln!(out, "Total Cycles Spent: {}", stats.total_cycles)?;
    writeln!(out, "Avg Memory Access Time (AMAT): {:.2} cycles", stats.amat)?;
    writeln!(out, "------------------------")
}
