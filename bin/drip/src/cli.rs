use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "drip")]
#[command(version, about = "Token faucet with cooldown and lifetime cap", long_about = None)]
pub struct Cli {
    /// Path to the configuration file (defaults plus DRIP_* variables if omitted)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Path to the data directory
    #[arg(short, long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP faucet (default)
    Serve,

    /// Print claim status and balance of one address
    Status {
        address: String,
    },

    /// Write a default configuration file
    InitConfig {
        #[arg(value_name = "FILE")]
        out: PathBuf,
    },
}
