//! User administration subcommands, driven through the authenticated client.

mod create;
mod delete;
mod get;
mod list;

use anyhow::Result;
use clap::{Args, Subcommand};

#[derive(Args, Debug)]
pub struct UsersCommand {
    #[command(subcommand)]
    pub command: UsersSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum UsersSubcommand {
    /// List users
    List(list::ListArgs),

    /// Fetch a single user
    Get(get::GetArgs),

    /// Create a new user
    Create(create::CreateArgs),

    /// Delete a user
    Delete(delete::DeleteArgs),
}

pub async fn handle(cmd: UsersCommand, service: &str) -> Result<()> {
    match cmd.command {
        UsersSubcommand::List(args) => list::run(args, service).await,
        UsersSubcommand::Get(args) => get::run(args, service).await,
        UsersSubcommand::Create(args) => create::run(args, service).await,
        UsersSubcommand::Delete(args) => delete::run(args, service).await,
    }
}
