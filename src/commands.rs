use std::io::Write;

use anyhow::Result;
use clap::Subcommand;
use serde_json::Value;
use store_backend::{StoreBackend, StoreKey};
use tracing::debug;

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List stored keys, optionally below a key prefix.
    List { prefix: Vec<String> },

    /// Print the value stored under a key.
    Get { key: Vec<String> },

    /// Store a value under a key.
    Set {
        key: Vec<String>,

        #[arg(long)]
        value: String,

        /// Parse the value as JSON instead of storing it as text.
        #[arg(long)]
        json: bool,
    },

    /// Remove a key.
    Remove { key: Vec<String> },

    /// Move a value to another key.
    Move {
        #[arg(long, value_delimiter = ',')]
        from: Vec<String>,

        #[arg(long, value_delimiter = ',')]
        to: Vec<String>,
    },

    /// Print the URL of a key.
    Url {
        key: Vec<String>,

        #[arg(long)]
        public: bool,
    },

    /// Print the store backend id.
    Id,

    /// Print the normalized backend configuration.
    Config,
}

pub async fn execute<W: Write>(command: &Command, backend: &dyn StoreBackend, out: &mut W) -> Result<()> {
    debug!(?command, backend = backend.class_name(), "executing command");
    match command {
        Command::List { prefix } => {
            for key in backend.list_keys(&StoreKey::from(prefix.clone())).await? {
                writeln!(out, "{}", key)?;
            }
        }
        Command::Get { key } => {
            match backend.get(&StoreKey::from(key.clone())).await? {
                Value::String(text) => writeln!(out, "{}", text)?,
                other => writeln!(out, "{}", serde_json::to_string_pretty(&other)?)?,
            }
        }
        Command::Set { key, value, json } => {
            let value = if *json {
                serde_json::from_str(value)?
            } else {
                Value::String(value.clone())
            };
            let reference = backend.set(&StoreKey::from(key.clone()), &value).await?;
            writeln!(out, "{}", reference)?;
        }
        Command::Remove { key } => {
            let removed = backend.remove_key(&StoreKey::from(key.clone())).await?;
            writeln!(out, "{}", removed)?;
        }
        Command::Move { from, to } => {
            backend
                .move_key(&StoreKey::from(from.clone()), &StoreKey::from(to.clone()))
                .await?;
        }
        Command::Url { key, public } => {
            let key = StoreKey::from(key.clone());
            let url = if *public {
                backend.get_public_url_for_key(&key).await?
            } else {
                backend.get_url_for_key(&key, None).await?
            };
            writeln!(out, "{}", url)?;
        }
        Command::Id => writeln!(out, "{}", backend.store_backend_id().await)?,
        Command::Config => writeln!(out, "{}", serde_json::to_string_pretty(&backend.config())?)?,
    }
    Ok(())
}
