//! Create user command implementation.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use tether_core::UserRecord;

use crate::output;
use crate::profile;

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Email address for the new user
    #[arg(long)]
    pub email: String,

    /// Initial password
    #[arg(long)]
    pub password: String,

    /// Application role
    #[arg(long, default_value = "user")]
    pub role: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserRequest<'a> {
    email: &'a str,
    password: &'a str,
    role: &'a str,
}

pub async fn run(args: CreateArgs, service: &str) -> Result<()> {
    let profile = profile::open(service).await?;

    let request = CreateUserRequest {
        email: &args.email,
        password: &args.password,
        role: &args.role,
    };

    let user: UserRecord = profile
        .manager
        .client()
        .post("/users", &request)
        .await
        .context("Failed to create user")?;

    output::success("User created");
    output::field("User", &user.id);
    output::field("Email", &user.email);

    Ok(())
}
