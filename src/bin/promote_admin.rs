//! Grant or revoke admin rights.
//!
//! Usage: `promote-admin <username> [--revoke] [--config config.yml]`

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;

use backdrop::{
    config::Config,
    db::{
        self,
        repositories::{SqlxSessionRepository, SqlxUserRepository},
    },
    services::{UserService, UserServiceError},
};

#[derive(Parser, Debug)]
#[command(name = "promote-admin", version)]
struct Cli {
    /// Account to change.
    username: String,

    /// Take admin rights away instead of granting them.
    #[arg(long)]
    revoke: bool,

    /// Configuration file (environment overrides apply as for the server).
    #[arg(long, default_value = "config.yml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load_with_env(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    let pool = db::create_pool(&config.database).await?;
    db::migrations::run_migrations(&pool).await?;

    let users = UserService::new(
        SqlxUserRepository::boxed(pool.clone()),
        SqlxSessionRepository::boxed(pool.clone()),
    );

    match users.set_admin(&cli.username, !cli.revoke).await {
        Ok(user) if user.is_admin => println!("{} is now an admin", user.username),
        Ok(user) => println!("{} is no longer an admin", user.username),
        Err(UserServiceError::NotFound(name)) => anyhow::bail!("No user named '{}'", name),
        Err(e) => return Err(e.into()),
    }

    pool.close().await;
    Ok(())
}
