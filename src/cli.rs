use clap::Parser;
use std::path::PathBuf;

/// Iris - canonical agent-protocol bridge
#[derive(Parser, Debug, Clone)]
#[command(name = "iris", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "IRIS_CONFIG", default_value = "iris.toml")]
    pub config: PathBuf,

    /// Server host address
    #[arg(long, env = "IRIS_HOST")]
    pub host: Option<String>,

    /// Server port
    #[arg(long, env = "IRIS_PORT")]
    pub port: Option<u16>,

    /// API key required on inbound bridge requests
    #[arg(long, env = "IRIS_API_KEY")]
    pub api_key: Option<String>,
}
