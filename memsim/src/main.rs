mod shell;

use std::fs::File;
use std::io::{self, BufReader, Write};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use memlib::io::get_reader;
use memlib::{Session, SimulatorConfig};
use crate::shell::{write_geometry, Echo, Shell};

#[cfg(debug_assertions)]
const DEBUG_DEFAULT: bool = true;

#[cfg(not(debug_assertions))]
const DEBUG_DEFAULT: bool = false;

#[derive(Parser, Debug)]
#[command(about = String::from("Physical memory allocator and cache hierarchy simulator"))]
struct Args {
    /// JSON simulator configuration, the stock setup is used when absent
    #[arg(short, long)]
    config: Option<String>,

    /// Read commands from this file instead of standard input
    #[arg(short, long)]
    script: Option<String>,

    /// Print dump, stats and cache_stats as JSON
    #[arg(short, long)]
    json: bool,

    #[arg(short, long, default_value_t = DEBUG_DEFAULT)]
    debug: bool,
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<(), String> {
    let args = Args::parse();
    init_logging(args.debug);
    let config = match &args.config {
        Some(path) => {
            let config_file = File::open(path).map_err(|e| format!("Couldn't open the config file at path {path}: {e}"))?;
            SimulatorConfig::from_reader(BufReader::new(config_file)).map_err(|e| format!("Couldn't parse the config file: {e}"))?
        }
        None => SimulatorConfig::default(),
    };
    let session = Session::new(&config).map_err(|e| format!("Couldn't build the simulator: {e}"))?;
    tracing::debug!(?config, "parsed configuration");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "[RAM] Initialized: {} bytes.", session.memory.total_size())
        .map_err(|e| format!("Couldn't write output: {e}"))?;
    for level in [session.cache.l1(), session.cache.l2()] {
        write_geometry(&mut out, level.geometry()).map_err(|e| format!("Couldn't write output: {e}"))?;
    }

    let mut shell = Shell::new(session, args.json);
    let result = match &args.script {
        Some(path) => {
            let script_file = File::open(path).map_err(|e| format!("Couldn't open the script at path {path}: {e}"))?;
            let reader = get_reader(script_file).map_err(|e| format!("Couldn't read the script: {e}"))?;
            shell.run(reader, &mut out, Echo::Script)
        }
        None => shell.run(io::stdin().lock(), &mut out, Echo::Prompt),
    };
    result.map_err(|e| format!("Couldn't run the shell: {e}"))
}
