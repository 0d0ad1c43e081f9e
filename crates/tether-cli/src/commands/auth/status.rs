//! Status command implementation.

use anyhow::Result;
use clap::Args;

use tether_core::AuthPhase;

use crate::output;
use crate::profile;

#[derive(Args, Debug)]
pub struct StatusArgs {}

pub async fn run(_args: StatusArgs, service: &str) -> Result<()> {
    let profile = profile::open(service).await?;
    let snapshot = profile.manager.snapshot().await;

    let phase = match profile.manager.phase() {
        AuthPhase::Authenticated => "authenticated",
        AuthPhase::Anonymous => "anonymous",
        AuthPhase::Loading => "loading",
        AuthPhase::Uninitialized => "uninitialized",
    };

    output::field("Phase", phase);
    output::field("Has user", &snapshot.has_user.to_string());
    output::field(
        "Token valid for",
        &format!("{}s", snapshot.time_remaining.as_secs()),
    );
    output::field("Refreshing", &snapshot.is_refreshing.to_string());
    if let Some(error) = &snapshot.error {
        output::field("Last error", error);
    }

    Ok(())
}
