use account_client::{
    AccountClient,
    commands::{self, BackoffKind, RetryOptions},
};
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// account-client - Organisation accounts API client
///
/// Create, fetch and delete accounts with configurable retries and backoff.
///
/// Examples:
///   account-client --base-url http://localhost:8080/v1 fetch <ID>
#[derive(Parser, Debug)]
#[command(author, version = env!("ACCOUNT_CLIENT_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Base URL of the accounts API (also via ACCOUNT_API_URL)
    #[arg(
        long = "base-url",
        env = "ACCOUNT_API_URL",
        value_name = "URL",
        global = true,
        default_value = "http://localhost:8080/v1"
    )]
    pub base_url: String,

    /// Retries after the first attempt for transport failures and 5xx responses
    #[arg(long, value_name = "N", global = true, default_value_t = 0)]
    pub max_retries: u32,

    /// Delay strategy between retries
    #[arg(long, value_enum, global = true, default_value_t = BackoffKind::None)]
    pub backoff: BackoffKind,

    /// Base delay between retries in milliseconds
    #[arg(long = "delay-ms", value_name = "MS", global = true, default_value_t = 100)]
    pub delay_ms: u64,

    /// Growth factor for exponential backoff
    #[arg(long, value_name = "N", global = true, default_value_t = 2)]
    pub multiplier: u32,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Create an account from a JSON file
    Create(CreateArgs),

    /// Fetch an account by ID
    Fetch(FetchArgs),

    /// Delete an account by ID and version
    Delete(DeleteArgs),
}

#[derive(clap::Args, Debug)]
pub struct CreateArgs {
    /// Path to a JSON document with the account to create
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct FetchArgs {
    #[arg(value_name = "ID")]
    pub id: Uuid,
}

#[derive(clap::Args, Debug)]
pub struct DeleteArgs {
    #[arg(value_name = "ID")]
    pub id: Uuid,

    /// Current version of the account
    #[arg(long, value_name = "N")]
    pub version: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let config = RetryOptions {
        max_retries: cli.max_retries,
        backoff: cli.backoff,
        delay: Duration::from_millis(cli.delay_ms),
        multiplier: cli.multiplier,
    }
    .into_config();
    let client = AccountClient::new(&cli.base_url, config)?;

    let output = match cli.command {
        Commands::Create(args) => commands::create(&client, &args.file).await?,
        Commands::Fetch(args) => commands::fetch(&client, args.id).await?,
        Commands::Delete(args) => commands::delete(&client, args.id, args.version).await?,
    };
    println!("{}", output);
    Ok(())
}
