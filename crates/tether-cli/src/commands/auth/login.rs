//! Login command implementation.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use tether_core::Credentials;

use crate::output;
use crate::profile;

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Email address to authenticate with
    #[arg(long)]
    pub email: String,

    /// Account password
    #[arg(long)]
    pub password: String,
}

pub async fn run(args: LoginArgs, service: &str) -> Result<()> {
    let profile = profile::open(service).await?;

    eprintln!("{}", "Logging in...".dimmed());

    let user = profile
        .manager
        .login(&Credentials::new(&args.email, &args.password))
        .await
        .context("Failed to login")?;

    output::success("Logged in successfully");
    println!();
    output::field("User", &user.id);
    output::field("Email", &user.email);
    if !user.role.is_empty() {
        output::field("Role", &user.role);
    }

    Ok(())
}
