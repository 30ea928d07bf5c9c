mod args;
mod clean;

use clap::Parser;
use log::{info, warn, LevelFilter};
use snafu::ErrorCompat;
use std::error::Error;

fn main() {
    let args = args::Args::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if args.verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();

    info!("args: {:?}", args);

    match clean::run_from_args(&args) {
        Ok(res) => {
            info!(
                "Done: {} rows, {} participants, {} test submissions",
                res.stats.rows_read,
                res.accepted.len(),
                res.rejected.len()
            );
            if !res.boundary_mismatches.is_empty() {
                warn!(
                    "{} rows with mismatched beginning and end identifiers",
                    res.boundary_mismatches.len()
                );
            }
        }
        Err(e) => {
            eprintln!("An error occured: {}", e);
            let mut source = e.source();
            while let Some(s) = source {
                eprintln!("  caused by: {}", s);
                source = s.source();
            }
            if let Some(bt) = ErrorCompat::backtrace(&e) {
                eprintln!("trace: {}", bt);
            }
            std::process::exit(1);
        }
    }
}
