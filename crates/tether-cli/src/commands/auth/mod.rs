//! Session subcommand implementations.

mod login;
mod logout;
mod refresh;
mod status;
mod whoami;

use anyhow::Result;
use clap::{Args, Subcommand};

#[derive(Args, Debug)]
pub struct AuthCommand {
    #[command(subcommand)]
    pub command: AuthSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum AuthSubcommand {
    /// Establish a session (login)
    Login(login::LoginArgs),

    /// End the session and clear stored tokens
    Logout(logout::LogoutArgs),

    /// Display the signed-in user
    Whoami(whoami::WhoamiArgs),

    /// Exchange the refresh token for a fresh token pair
    Refresh(refresh::RefreshArgs),

    /// Show the session snapshot
    Status(status::StatusArgs),
}

pub async fn handle(cmd: AuthCommand, service: &str) -> Result<()> {
    match cmd.command {
        AuthSubcommand::Login(args) => login::run(args, service).await,
        AuthSubcommand::Logout(args) => logout::run(args, service).await,
        AuthSubcommand::Whoami(args) => whoami::run(args, service).await,
        AuthSubcommand::Refresh(args) => refresh::run(args, service).await,
        AuthSubcommand::Status(args) => status::run(args, service).await,
    }
}
