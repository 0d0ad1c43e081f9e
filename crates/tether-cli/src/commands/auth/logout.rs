//! Logout command implementation.

use anyhow::{Context, Result};
use clap::Args;

use crate::output;
use crate::profile;

#[derive(Args, Debug)]
pub struct LogoutArgs {}

pub async fn run(_args: LogoutArgs, service: &str) -> Result<()> {
    let profile = profile::open(service).await?;

    profile
        .manager
        .logout()
        .await
        .context("Failed to logout")?;

    output::success("Logged out; session cleared");
    Ok(())
}
