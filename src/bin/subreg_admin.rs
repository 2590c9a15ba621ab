//! subreg-admin: Subscription registry administration
//!
//! Runs one registry operation against the configured store and prints the
//! result to stdout.
//!
//! ## Usage
//! ```text
//! subreg-admin targets <message-type>
//! subreg-admin list
//! subreg-admin subscribe <subscriber> <message-type> [expires-rfc3339]
//! subreg-admin unsubscribe <subscriber> <message-type>
//! subreg-admin expire <subscriber> <message-type>
//! ```
//!
//! ## Configuration
//! - SUBREG_CONFIG: Path to a YAML config file (optional)
//! - SUBREG__CONNECTION_STRING: Database to administer (required)
//! - SUBREG__ENDPOINT: Publisher endpoint whose subscriptions to manage
//! - SUBREG_LOG: Log filter (default: info)

use std::error::Error;

use chrono::{DateTime, Utc};
use tracing::info;

use subscription_registry::storage::ConnectionTarget;
use subscription_registry::utils::bootstrap::init_tracing;
use subscription_registry::{RegistryConfig, SubscriptionRegistry, SubscriptionStore};

const USAGE: &str = "usage: subreg-admin <targets TYPE | list | subscribe SUB TYPE [EXPIRES] | unsubscribe SUB TYPE | expire SUB TYPE>";

enum Command {
    Targets { message_type: String },
    List,
    Subscribe { subscriber: String, message_type: String, expires_at: Option<DateTime<Utc>> },
    Unsubscribe { subscriber: String, message_type: String },
    Expire { subscriber: String, message_type: String },
}

impl Command {
    fn parse(args: &[String]) -> Result<Self, Box<dyn Error>> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let command = match args.as_slice() {
            ["targets", message_type] => Self::Targets { message_type: message_type.to_string() },
            ["list"] => Self::List,
            ["subscribe", subscriber, message_type] => Self::Subscribe {
                subscriber: subscriber.to_string(),
                message_type: message_type.to_string(),
                expires_at: None,
            },
            ["subscribe", subscriber, message_type, expires] => Self::Subscribe {
                subscriber: subscriber.to_string(),
                message_type: message_type.to_string(),
                expires_at: Some(DateTime::parse_from_rfc3339(expires)?.with_timezone(&Utc)),
            },
            ["unsubscribe", subscriber, message_type] => Self::Unsubscribe {
                subscriber: subscriber.to_string(),
                message_type: message_type.to_string(),
            },
            ["expire", subscriber, message_type] => Self::Expire {
                subscriber: subscriber.to_string(),
                message_type: message_type.to_string(),
            },
            _ => return Err(USAGE.into()),
        };
        Ok(command)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;

    let config = RegistryConfig::load(None)?;
    let connection_string = config
        .connection_string
        .clone()
        .ok_or("connection_string is not configured")?;

    info!(publisher = %config.endpoint, table = %config.table_name, "subreg-admin started");

    match ConnectionTarget::parse(&connection_string) {
        #[cfg(feature = "sqlite")]
        ConnectionTarget::Sqlite { .. } => {
            use std::str::FromStr;

            use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
            use subscription_registry::storage::SqliteSubscriptionStore;

            let options = SqliteConnectOptions::from_str(&connection_string)?.create_if_missing(true);
            let pool = SqlitePool::connect_with(options).await?;
            let store = SqliteSubscriptionStore::from_config(pool, &config);
            run(SubscriptionRegistry::from_config(store, &config), command).await
        }
        #[cfg(feature = "postgres")]
        ConnectionTarget::Postgres { .. } => {
            use subscription_registry::storage::PostgresSubscriptionStore;

            let pool = sqlx::PgPool::connect(&connection_string).await?;
            let store = PostgresSubscriptionStore::from_config(pool, &config);
            run(SubscriptionRegistry::from_config(store, &config), command).await
        }
        other => Err(format!("Unsupported database: {}", other).into()),
    }
}

async fn run<S: SubscriptionStore>(
    registry: SubscriptionRegistry<S>,
    command: Command,
) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Targets { message_type } => {
            for endpoint in registry.target_endpoints(None, &message_type).await? {
                println!("{}", endpoint);
            }
        }
        Command::List => {
            for sub in registry.subscriptions(None).await? {
                let expires = sub
                    .expires_at
                    .map_or_else(|| "never".to_string(), |at| at.to_rfc3339());
                println!(
                    "{}\t{}\tcreated={}\texpires={}",
                    sub.message_type,
                    sub.subscriber_endpoint,
                    sub.created_at.to_rfc3339(),
                    expires
                );
            }
        }
        Command::Subscribe { subscriber, message_type, expires_at } => {
            registry
                .subscribe(None, &subscriber, &message_type, expires_at)
                .await?;
        }
        Command::Unsubscribe { subscriber, message_type } => {
            registry.unsubscribe(None, &subscriber, &message_type).await?;
        }
        Command::Expire { subscriber, message_type } => {
            registry
                .handle_expiration_if_necessary(None, &subscriber, &message_type)
                .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_commands() {
        assert!(matches!(
            Command::parse(&args(&["targets", "OrderPlaced"])).unwrap(),
            Command::Targets { message_type } if message_type == "OrderPlaced"
        ));
        assert!(matches!(Command::parse(&args(&["list"])).unwrap(), Command::List));
        assert!(matches!(
            Command::parse(&args(&["subscribe", "S1", "OrderPlaced", "2030-01-01T00:00:00Z"])).unwrap(),
            Command::Subscribe { expires_at: Some(_), .. }
        ));
        assert!(matches!(
            Command::parse(&args(&["expire", "S1", "OrderPlaced"])).unwrap(),
            Command::Expire { .. }
        ));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(Command::parse(&args(&[])).is_err());
        assert!(Command::parse(&args(&["targets"])).is_err());
        assert!(Command::parse(&args(&["subscribe", "S1", "T", "tomorrow"])).is_err());
    }
}
