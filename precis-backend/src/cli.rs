use clap::Parser;

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "precis-backend", version, about = "Document summarization service")]
pub struct CliArgs {
    /// Path to configuration file (overrides PRECIS_CONFIG_PATH)
    #[arg(short = 'c', long = "config", alias = "config-path", value_name = "PATH")]
    pub config_path: Option<String>,
}

impl CliArgs {
    /// Resolve the config path: CLI first, then environment.
    pub fn resolve_config_path(self) -> Option<String> {
        self.config_path
            .or_else(|| std::env::var("PRECIS_CONFIG_PATH").ok())
            .filter(|p| !p.trim().is_empty())
    }
}
