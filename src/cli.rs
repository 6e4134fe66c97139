use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "acctwatch")]
#[command(version = concat!("Ver:", env!("CARGO_PKG_VERSION")))]
#[command(about = "Proxied account status tracker with transition alerts and warmup ceilings")]
pub struct Cli {
    /// Write a default config file to ~/.acctwatch/config.toml
    #[arg(short = 'i', long = "init")]
    pub init: bool,

    /// Validate the configuration and exit
    #[arg(short = 'c', long = "check")]
    pub check: bool,

    /// Print the effective configuration
    #[arg(short = 'p', long = "print")]
    pub print: bool,

    /// Config file to use instead of ~/.acctwatch/config.toml
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Test mode: check only the first N profiles
    #[arg(short = 'l', long = "limit", value_name = "N")]
    pub limit: Option<usize>,

    /// Print the proxy configuration audit and exit
    #[arg(short = 'a', long = "audit")]
    pub audit: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
