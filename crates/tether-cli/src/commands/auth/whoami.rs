//! Whoami command implementation.

use anyhow::Result;
use clap::Args;

use tether_core::AuthPhase;

use crate::output;
use crate::profile;

#[derive(Args, Debug)]
pub struct WhoamiArgs {}

pub async fn run(_args: WhoamiArgs, service: &str) -> Result<()> {
    let profile = profile::open(service).await?;

    if profile.manager.phase() != AuthPhase::Authenticated {
        output::warning("Not signed in. Run 'tether auth login' first.");
        return Ok(());
    }

    if let Some(user) = profile.manager.current_user() {
        output::field("User", &user.id);
        output::field("Email", &user.email);
        if !user.role.is_empty() {
            output::field("Role", &user.role);
        }
    }

    let snapshot = profile.manager.snapshot().await;
    output::field(
        "Token valid for",
        &format!("{}s", snapshot.time_remaining.as_secs()),
    );

    Ok(())
}
