//! API key management.

use tokio::runtime::Runtime;
use tracing::warn;

use super::{KeyAction, open_store};
use crate::config::Config;
use crate::db::{self, ApiKey};
use crate::speech::ElevenLabsClient;

pub fn cmd_keys(rt: &Runtime, config: &Config, action: &KeyAction) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_store(config).await?;

        match action {
            KeyAction::List => {
                let keys = db::list_api_keys(&pool).await?;
                if keys.is_empty() {
                    println!("No API keys. Add one with `keys add <LABEL> <KEY>`.");
                }
                for key in &keys {
                    println!("{}", format_key(key));
                }
            }
            KeyAction::Add { label, key } => {
                let id = db::add_api_key(&pool, label, key.trim()).await?;
                println!("Added key {} ({}).", id, label);
            }
            KeyAction::Remove { id } => {
                if db::delete_api_key(&pool, *id).await? {
                    println!("Removed key {}.", id);
                } else {
                    anyhow::bail!("No key with id {}", id);
                }
            }
            KeyAction::Refresh => {
                let client = ElevenLabsClient::new(&config.speech)?;
                for key in db::list_api_keys(&pool).await? {
                    match client.quota(&key.api_key).await {
                        Ok(quota) => {
                            db::update_api_key_quota(
                                &pool,
                                key.id,
                                quota.character_count,
                                quota.character_limit,
                            )
                            .await?;
                            println!(
                                "{}: {}/{} characters",
                                key.label, quota.character_count, quota.character_limit
                            );
                        }
                        Err(e) => {
                            warn!(target: "cli", key = %key.label, error = %e, "Quota lookup failed");
                            println!("{}: {}", key.label, e);
                        }
                    }
                }
            }
        }
        anyhow::Ok(())
    })
}

fn format_key(key: &ApiKey) -> String {
    let percent = if key.character_limit > 0 {
        key.character_count as f64 / key.character_limit as f64 * 100.0
    } else {
        0.0
    };
    let status = if key.exhausted { "exhausted" } else { "active" };
    format!(
        "{:>4}  {:<16}  {}  {}/{} ({:.0}%)  {}",
        key.id,
        key.label,
        key.masked(),
        key.character_count,
        key.character_limit,
        percent,
        status
    )
}
