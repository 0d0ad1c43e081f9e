//! List users command implementation.

use anyhow::{Context, Result};
use clap::Args;

use tether_core::UserRecord;

use crate::output;
use crate::profile;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Print the raw JSON response
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: ListArgs, service: &str) -> Result<()> {
    let profile = profile::open(service).await?;

    let users: Vec<UserRecord> = profile
        .manager
        .client()
        .get("/users")
        .await
        .context("Failed to list users")?;

    if args.json {
        return output::json_pretty(&users);
    }

    for user in &users {
        println!("{}  {}  {}", user.id, user.email, user.role);
    }
    output::field("Total", &users.len().to_string());

    Ok(())
}
