//! Refresh command implementation.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use crate::output;
use crate::profile;

#[derive(Args, Debug)]
pub struct RefreshArgs {}

pub async fn run(_args: RefreshArgs, service: &str) -> Result<()> {
    let profile = profile::open(service).await?;

    eprintln!("{}", "Refreshing session...".dimmed());

    profile
        .manager
        .renew_session()
        .await
        .context("Failed to refresh session")?;

    let snapshot = profile.manager.snapshot().await;
    output::success("Session refreshed");
    output::field(
        "Token valid for",
        &format!("{}s", snapshot.time_remaining.as_secs()),
    );

    Ok(())
}
