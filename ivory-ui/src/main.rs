mod runtime;
mod ui;

use std::fs::File;
use std::path::PathBuf;

use ivory_core::{Config, MidiInputManager};

use runtime::{Overrides, Runtime};
use ui::TerminalHost;

const USAGE: &str = "usage: ivory [-v|--verbose] [--config <path>] [--osc <host:port>] [--midi <name>] [--list-midi] [--print-config]";

fn init_logging(verbose: bool) {
    use simplelog::*;

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };

    let log_path = dirs::config_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("ivory")
        .join("ivory.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = File::create(&log_path).unwrap_or_else(|_| {
        File::create("/tmp/ivory.log").expect("Cannot create log file")
    });

    WriteLogger::init(log_level, simplelog::Config::default(), log_file)
        .expect("Failed to initialize logger");

    log::info!("ivory starting (log level: {:?})", log_level);
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1).cloned())
}

fn main() -> std::io::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("{}", USAGE);
        return Ok(());
    }
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    init_logging(verbose);

    let config = match flag_value(&args, "--config") {
        Some(path) => Config::load_from(&PathBuf::from(path)),
        None => Config::load(),
    };

    if args.iter().any(|a| a == "--print-config") {
        match config.settings_toml() {
            Ok(toml) => print!("{}", toml),
            Err(e) => {
                eprintln!("Cannot print settings: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    if args.iter().any(|a| a == "--list-midi") {
        let mut midi = MidiInputManager::new();
        midi.refresh_ports();
        for port in midi.list_ports() {
            println!("{}: {}", port.index, port.name);
        }
        return Ok(());
    }

    let overrides = Overrides {
        osc_server: flag_value(&args, "--osc"),
        midi_port: flag_value(&args, "--midi"),
    };
    let mut runtime = Runtime::new(&config, overrides);

    let mut host = TerminalHost::new()?;
    host.start()?;

    let result = runtime.run(&mut host);

    host.stop()?;
    result
}
