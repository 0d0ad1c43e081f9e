//! Get user command implementation.

use anyhow::{Context, Result};
use clap::Args;

use tether_core::UserRecord;

use crate::output;
use crate::profile;

#[derive(Args, Debug)]
pub struct GetArgs {
    /// User id to fetch
    pub id: String,
}

pub async fn run(args: GetArgs, service: &str) -> Result<()> {
    let profile = profile::open(service).await?;

    let user: UserRecord = profile
        .manager
        .client()
        .get(&format!("/users/{}", args.id))
        .await
        .context("Failed to fetch user")?;

    output::json_pretty(&user)
}
