//! Delete user command implementation.

use anyhow::{Context, Result};
use clap::Args;

use crate::output;
use crate::profile;

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// User id to delete
    pub id: String,
}

pub async fn run(args: DeleteArgs, service: &str) -> Result<()> {
    let profile = profile::open(service).await?;

    profile
        .manager
        .client()
        .delete(&format!("/users/{}", args.id))
        .await
        .context("Failed to delete user")?;

    output::success("User deleted");
    Ok(())
}
