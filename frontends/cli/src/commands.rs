use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tracing::info;

use coachdeck::api::{
    AccountabilityMember, BuddyMessage, Client, EmailMetric, OwnerScope, Subscription,
    SyncedEntity, Task, Workflow,
};
use coachdeck::billing;
use coachdeck::views::engagement::{EngagementSummary, campaign_ranking};
use coachdeck::views::leaderboard::leaderboard;
use coachdeck::{ActionDispatcher, AppConfig, ColumnMapping, EntitySync, RemoteStore, SyncOutcome, session};
use coachdeck_services::ServiceSet;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Import { path: PathBuf, overrides: Vec<String> },
    Leaderboard,
    Engagement,
    Entitlement,
    Watch { table: String },
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Self> {
        let (name, rest) = args.split_first().ok_or_else(|| anyhow!("missing command"))?;
        match name.as_str() {
            "import" => {
                let mut path = None;
                let mut overrides = Vec::new();
                let mut iter = rest.iter();
                while let Some(arg) = iter.next() {
                    if arg == "--map" || arg == "-m" {
                        let spec = iter.next().ok_or_else(|| anyhow!("--map needs header=field"))?;
                        overrides.push(spec.clone());
                    } else if path.is_none() {
                        path = Some(PathBuf::from(arg));
                    } else {
                        bail!("unexpected argument '{}'", arg);
                    }
                }
                let path = path.ok_or_else(|| anyhow!("import needs a CSV file"))?;
                Ok(Command::Import { path, overrides })
            }
            "leaderboard" => Ok(Command::Leaderboard),
            "engagement" => Ok(Command::Engagement),
            "entitlement" => Ok(Command::Entitlement),
            "watch" => {
                let table = rest.first().ok_or_else(|| anyhow!("watch needs a table name"))?;
                Ok(Command::Watch {
                    table: table.clone(),
                })
            }
            other => bail!("unknown command '{}'", other),
        }
    }
}

pub async fn run(command: Command, services: &ServiceSet, config: &AppConfig) -> Result<()> {
    let store: Arc<dyn RemoteStore> = Arc::new(services.store.clone());
    let scope = session().scope()?;

    match command {
        Command::Import { path, overrides } => {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("Failed to read CSV file {}", path.display()))?;
            let mut mapping = ColumnMapping::default();
            for spec in &overrides {
                mapping = mapping.with_override(spec)?;
            }

            let clients = load::<Client>(store, &scope, config).await?;
            let summary = ActionDispatcher::new()
                .import_clients_csv(&clients, &bytes, &mapping)
                .await?;
            print_json(&summary)
        }
        Command::Leaderboard => {
            let members = load::<AccountabilityMember>(store, &scope, config).await?;
            print_json(&leaderboard(&members.items()))
        }
        Command::Engagement => {
            let metrics = load::<EmailMetric>(store, &scope, config).await?;
            let items = metrics.items();
            print_json(&json!({
                "overall": EngagementSummary::from_metrics(&items),
                "campaigns": campaign_ranking(&items),
            }))
        }
        Command::Entitlement => {
            let subscriptions = load::<Subscription>(store, &scope, config).await?;
            let items = subscriptions.items();
            let now = Utc::now();
            let latest = billing::latest_subscription(&items);
            print_json(&json!({
                "status": latest.map(|s| s.status.to_string()).unwrap_or_else(|| "none".to_string()),
                "tier": latest.map(|s| s.tier.clone()),
                "grace_period_end": latest.and_then(|s| s.grace_period_end),
                "entitled": billing::is_entitled(&items, now),
            }))
        }
        Command::Watch { table } => match table.as_str() {
            "clients" => watch::<Client>(store, &scope, config).await,
            "tasks" => watch::<Task>(store, &scope, config).await,
            "accountability_members" => watch::<AccountabilityMember>(store, &scope, config).await,
            "buddy_messages" => watch::<BuddyMessage>(store, &scope, config).await,
            "email_metrics" => watch::<EmailMetric>(store, &scope, config).await,
            "subscriptions" => watch::<Subscription>(store, &scope, config).await,
            "workflows" => watch::<Workflow>(store, &scope, config).await,
            other => bail!("unknown table '{}'", other),
        },
    }
}

async fn load<T: SyncedEntity>(
    store: Arc<dyn RemoteStore>,
    scope: &OwnerScope,
    config: &AppConfig,
) -> Result<EntitySync<T>> {
    let mut mirror = EntitySync::<T>::new(store);
    if let Some(limit) = config.sync.snapshot_limit {
        mirror = mirror.with_limit(limit);
    }
    match mirror.initialize(scope).await {
        SyncOutcome::Failed(e) => Err(anyhow!("Failed to load {}: {}", T::TABLE, e)),
        _ => Ok(mirror),
    }
}

/// Print one summary line per change until interrupted.
async fn watch<T: SyncedEntity>(
    store: Arc<dyn RemoteStore>,
    scope: &OwnerScope,
    config: &AppConfig,
) -> Result<()> {
    let mirror = load::<T>(store, scope, config).await?;
    mirror.subscribe(scope).await?;
    info!("[CLI] Watching {} (Ctrl-C to stop)", T::TABLE);

    let mut changes = mirror.change_stream();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            next = changes.next() => {
                if next.is_none() {
                    break;
                }
                let state = mirror.snapshot();
                println!(
                    "{} {}: {} row(s){}{}",
                    Utc::now().format("%H:%M:%S"),
                    T::TABLE,
                    state.items.len(),
                    if state.stale { " (stale)" } else { "" },
                    if state.subscribed { "" } else { " (feed closed)" },
                );
            }
        }
    }

    mirror.teardown();
    Ok(())
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
