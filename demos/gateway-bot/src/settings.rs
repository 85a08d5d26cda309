//! Command-line and environment settings.

use std::{convert::Infallible, num::NonZeroUsize};

use anyhow::{Result, bail};
use clap::Parser;
use secrecy::SecretString;

#[derive(Parser)]
#[command(name = "gateway-bot")]
#[command(about = "Example bot running a single gateway session")]
#[command(version)]
pub struct Settings {
    /// Bot credential
    #[arg(long, env = "GATEWAY_TOKEN", hide_env_values = true, value_parser = secret)]
    pub token: SecretString,

    /// Application the commands belong to
    #[arg(long, env = "GATEWAY_APPLICATION_ID")]
    pub application_id: String,

    /// Shard served by this process (requires --shard-total)
    #[arg(long, env = "SHARD_ID", requires = "shard_total")]
    pub shard_id: Option<u32>,

    /// Total number of shards (requires --shard-id)
    #[arg(long, env = "SHARD_TOTAL", requires = "shard_id")]
    pub shard_total: Option<u32>,

    /// Entries kept in the message cache
    #[arg(long, env = "CACHE_CAPACITY", default_value = "65536")]
    pub cache_capacity: NonZeroUsize,

    /// Declare the commands remotely before connecting
    #[arg(long)]
    pub publish: bool,
}

impl Settings {
    /// Shard pair, if sharding was requested.
    ///
    /// # Errors
    /// Returns error if the shard id is not below the total.
    pub fn shard(&self) -> Result<Option<(u32, u32)>> {
        match (self.shard_id, self.shard_total) {
            (Some(id), Some(total)) if id >= total => {
                bail!("shard id ({id}) must be below shard total ({total})")
            }
            (Some(id), Some(total)) => Ok(Some((id, total))),
            _ => Ok(None),
        }
    }
}

#[allow(clippy::unnecessary_wraps)]
fn secret(raw: &str) -> Result<SecretString, Infallible> {
    Ok(SecretString::from(raw))
}
