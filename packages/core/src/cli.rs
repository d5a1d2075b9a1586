use clap::Parser;

/// Feed harvester CLI arguments. Each flag overrides its environment variable.
#[derive(Debug, Parser)]
#[command(
    name = "feed-harvester",
    version,
    about = "Polls flight-position and weather-radar feeds and stores normalized records"
)]
pub struct Cli {
    /// Comma-separated sources to enable (flight_track, radar_image)
    #[arg(long)]
    pub sources: Option<String>,

    /// Harvester tick in seconds
    #[arg(long)]
    pub tick_seconds: Option<u64>,

    /// SQLite database URL
    #[arg(long)]
    pub database_url: Option<String>,

    /// Address for the /health and /metrics endpoint, e.g. 0.0.0.0:9100
    #[arg(long)]
    pub ops_addr: Option<String>,

    /// Run a single harvest pass and exit
    #[arg(long)]
    pub once: bool,
}
