mod commands;

use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use coachdeck::{AppConfig, Session, session};
use coachdeck_services::ServiceSet;

use commands::Command;

const USAGE: &str = "usage: coachdeck [--config <path>] <command>

commands:
  import <file.csv> [--map header=field]...   import clients from CSV
  leaderboard                                 accountability leaderboard
  engagement                                  email engagement summary
  entitlement                                 current subscription status
  watch <table>                               follow a table's change feed";

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let mut args = std::env::args().skip(1);
    let mut config_path: Option<PathBuf> = None;
    let mut rest = Vec::new();

    while let Some(arg) = args.next() {
        if arg == "--config" || arg == "-c" {
            match args.next() {
                Some(path) => config_path = Some(PathBuf::from(path)),
                None => bail!("--config needs a path\n\n{}", USAGE),
            }
        } else if arg == "--help" || arg == "-h" {
            println!("{}", USAGE);
            return Ok(());
        } else {
            rest.push(arg);
        }
    }

    let command = Command::parse(&rest).with_context(|| USAGE.to_string())?;

    let config_path = AppConfig::resolve_path(config_path);
    let config = AppConfig::load(config_path.as_deref())?;

    // Logs go to stderr so command output on stdout stays machine-readable.
    // RUST_LOG wins over the configured filter.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Some(path) = &config_path {
        tracing::info!("[CLI] Using config {}", path.display());
    }

    let user_id = std::env::var("COACHDECK_USER_ID")
        .context("COACHDECK_USER_ID must name the signed-in user")?;
    let access_token = std::env::var("COACHDECK_ACCESS_TOKEN")
        .context("COACHDECK_ACCESS_TOKEN must hold the user's access token")?;
    session().initialize(Session::new(user_id, access_token.clone()))?;

    let services = ServiceSet::from_config(&config, Some(&access_token))?;
    let result = commands::run(command, &services, &config).await;

    session().teardown();
    result
}
