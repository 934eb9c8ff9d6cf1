//! Command implementations behind the `account-client` binary.

use anyhow::{Context, Result};
use log::debug;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use crate::account::{AccountApi, CreateAccountRequest};
use crate::config::ClientConfig;

/// Backoff strategy selectable from the command line.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffKind {
    #[default]
    None,
    Linear,
    Exponential,
}

/// Retry settings collected from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOptions {
    pub max_retries: u32,
    pub backoff: BackoffKind,
    pub delay: Duration,
    pub multiplier: u32,
}

impl RetryOptions {
    pub fn into_config(self) -> ClientConfig {
        let config = ClientConfig::default().with_retries_on_default_policy(self.max_retries);
        match self.backoff {
            BackoffKind::None => config,
            BackoffKind::Linear => config.with_linear_backoff(self.delay),
            BackoffKind::Exponential => config.with_exponential_backoff(self.delay, self.multiplier),
        }
    }
}

/// Creates the account described by the JSON file at `path`.
#[tracing::instrument(skip(api))]
pub async fn create<A: AccountApi + ?Sized>(api: &A, path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read account file {:?}", path))?;
    let request: CreateAccountRequest = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse account file {:?}", path))?;

    debug!("Creating account {} from {:?}", request.data.id, path);
    let created = api.create_account(&request).await?;
    Ok(serde_json::to_string_pretty(&created)?)
}

#[tracing::instrument(skip(api))]
pub async fn fetch<A: AccountApi + ?Sized>(api: &A, id: Uuid) -> Result<String> {
    let account = api.fetch_account(id).await?;
    Ok(serde_json::to_string_pretty(&account)?)
}

#[tracing::instrument(skip(api))]
pub async fn delete<A: AccountApi + ?Sized>(api: &A, id: Uuid, version: i64) -> Result<String> {
    api.delete_account(id, version).await?;
    Ok(format!("Deleted account {}", id))
}
