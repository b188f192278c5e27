use clap::Parser;
use simplelog::{CombinedLogger, Config, LevelFilter, SharedLogger, TermLogger, WriteLogger};
use std::fs::File;
use takeoutsort::takeoutsort_core::pipeline::print_summary;
use takeoutsort::takeoutsort_core::{Cli, Pipeline};

fn main() {
    let cli = Cli::parse();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        if cli.verbose { LevelFilter::Info } else { LevelFilter::Warn },
        Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )];

    if let Some(log_path) = &cli.log {
        match File::create(log_path) {
            Ok(file) => loggers.push(WriteLogger::new(cli.log_level, Config::default(), file)),
            Err(e) => eprintln!("Could not open log file {}: {e}", log_path.display()),
        }
    }

    if let Err(e) = CombinedLogger::init(loggers) {
        eprintln!("Logger initialization failed: {e}");
    }

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(e.exit_code());
        }
    };

    let pipeline = Pipeline::new(config);
    match pipeline.run() {
        Ok(result) => {
            print_summary(&result);
            std::process::exit(if result.success { 0 } else { 1 });
        }
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(e.exit_code());
        }
    }
}
