//! Command-line arguments. Grounded on the teacher's `clap` derive `Args`
//! struct; the per-download range/type flags are gone (this is a service,
//! not a one-shot downloader) and replaced with the handful of startup
//! overrides the service needs.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about = "Media acquisition service for aniworld.to and s.to")]
pub struct Args {
    /// Directory holding config.json, the catalog database and log files
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Override the HTTP port from config.json
    #[arg(long)]
    pub port: Option<u16>,

    /// Enable verbose (trace-level) logging
    #[arg(short, long)]
    pub debug: bool,
}
