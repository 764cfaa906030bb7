//! OAuth Accounts Administration CLI Tool
//!
//! Operator interface over the client lifecycle and user account managers. Each
//! invocation opens the configured credential store, runs one command under a
//! request deadline, and prints the result as JSON.
//!
//! ## Usage Examples
//!
//! ```bash
//! # Register a client for an owner and disable it again
//! oauth-accounts-admin client create --owner-id 01J8Z3... --name "Portal" \
//!   --redirect-uri "https://portal.example.com/callback"
//! oauth-accounts-admin client disable --client-id 01J8Z4...
//!
//! # Create a user and rotate the password
//! oauth-accounts-admin user create --name "Ana" --email ana@example.com --password s3cret
//! oauth-accounts-admin user change-password --user-id 01J8Z5... \
//!   --current-password s3cret --new-password n3w
//! ```
//!
//! ## Environment Variables
//!
//! - `STORAGE_BACKEND`: `sqlite` (default) or `memory`, which does not persist between runs
//! - `DATABASE_URL`: SQLite connection string
//! - `STORE_TIMEOUT`: deadline for the whole command, e.g. `5s`
//! - `PASSWORD_HASH_COST`: bcrypt cost for new hashes
//! - `DEFAULT_USER_GRANTS`: comma separated grants for new users
//! - `RUST_LOG`: log filter, logs go to stderr

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use oauth_accounts::{
    config::Config,
    oauth::{
        ClientLifecycleManager, ClientPatch, ExpirationAction, NewClient, NewUser,
        PasswordChange, PasswordHasher, RequestContext, UserAccountManager, UserId, UserPatch,
        UserProjection,
    },
    storage::{StorageBackend, create_storage_backend, parse_storage_backend},
};
use serde::Serialize;
use serde_json::json;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::prelude::*;

/// Main CLI application structure
#[derive(Parser)]
#[command(
    name = "oauth-accounts-admin",
    about = "OAuth client and user account administration",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    /// Output format
    #[arg(long, value_enum, default_value = "json")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Output format options
#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    /// JSON formatted output
    Json,
    /// Pretty-printed JSON output
    JsonPretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage registered clients
    #[command(subcommand)]
    Client(ClientCommand),
    /// Manage user accounts
    #[command(subcommand)]
    User(UserCommand),
}

#[derive(Subcommand)]
enum ClientCommand {
    /// List active clients
    List,
    /// Show one active client
    Get(ClientIdArgs),
    /// List active clients owned by a user
    Owned(OwnerArgs),
    /// Register a new client
    Create(CreateClientArgs),
    /// Change descriptive fields of a client
    Update(UpdateClientArgs),
    /// Soft delete a client
    Delete(ClientIdArgs),
    /// Make a client valid, until `--expired-at` or forever
    Enable(EnableArgs),
    /// Expire a client now
    Disable(ClientIdArgs),
}

#[derive(Subcommand)]
enum UserCommand {
    /// List active users
    List,
    /// Show one active user
    Get(GetUserArgs),
    /// Create a user account
    Create(CreateUserArgs),
    /// Change profile fields of a user
    Update(UpdateUserArgs),
    /// Soft delete a user
    Delete(UserIdArgs),
    /// Rotate a user's password
    ChangePassword(ChangePasswordArgs),
    /// Record that a user authorized a client
    Authorize(AuthorizeArgs),
    /// List the valid clients a user has authorized
    Clients(UserIdArgs),
}

#[derive(Args)]
struct ClientIdArgs {
    #[arg(long)]
    client_id: String,
}

#[derive(Args)]
struct OwnerArgs {
    #[arg(long)]
    owner_id: String,
}

#[derive(Args)]
struct CreateClientArgs {
    /// User that owns the new client
    #[arg(long)]
    owner_id: String,
    #[arg(long)]
    name: String,
    #[arg(long)]
    client_uri: Option<String>,
    #[arg(long)]
    redirect_uri: Option<String>,
    /// RFC 3339 expiration instant
    #[arg(long)]
    expired_at: Option<DateTime<Utc>>,
}

#[derive(Args)]
struct UpdateClientArgs {
    #[arg(long)]
    client_id: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    client_uri: Option<String>,
    #[arg(long)]
    redirect_uri: Option<String>,
    #[arg(long)]
    expired_at: Option<DateTime<Utc>>,
}

#[derive(Args)]
struct EnableArgs {
    #[arg(long)]
    client_id: String,
    /// RFC 3339 expiration instant; omitted means never expires
    #[arg(long)]
    expired_at: Option<DateTime<Utc>>,
}

#[derive(Args)]
struct UserIdArgs {
    #[arg(long)]
    user_id: String,
}

#[derive(Args)]
struct GetUserArgs {
    #[arg(long)]
    user_id: String,
    /// Include the password hash
    #[arg(long)]
    with_password: bool,
}

#[derive(Args)]
struct CreateUserArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
    #[arg(long)]
    institution: Option<String>,
    #[arg(long)]
    occupation: Option<String>,
}

#[derive(Args)]
struct UpdateUserArgs {
    #[arg(long)]
    user_id: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    institution: Option<String>,
    #[arg(long)]
    occupation: Option<String>,
}

#[derive(Args)]
struct ChangePasswordArgs {
    #[arg(long)]
    user_id: String,
    #[arg(long)]
    current_password: String,
    #[arg(long)]
    new_password: String,
}

#[derive(Args)]
struct AuthorizeArgs {
    #[arg(long)]
    user_id: String,
    #[arg(long)]
    client_id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "oauth_accounts=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::new()?;
    tracing::debug!(version = %config.version, backend = %config.storage_backend, "Starting");

    let backend =
        parse_storage_backend(&config.storage_backend, config.database_url.as_deref())?;
    if backend == StorageBackend::Memory {
        tracing::warn!("Memory backend selected, changes are lost when the command exits");
    }
    let storage = create_storage_backend(backend).await?;

    let clients = ClientLifecycleManager::new(storage.clone());
    let users = UserAccountManager::new(
        storage,
        PasswordHasher::new(*config.password_hash_cost.as_ref()),
    )
    .with_default_grants(config.default_user_grants.as_ref().clone());

    let token = CancellationToken::new();
    let ctx = RequestContext::with_timeout(*config.store_timeout.as_ref())
        .with_cancellation(token.clone());
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling request");
            token.cancel();
        }
    });

    match cli.command {
        Commands::Client(command) => run_client_command(&cli.format, &clients, &ctx, command).await,
        Commands::User(command) => run_user_command(&cli.format, &users, &ctx, command).await,
    }
}

async fn run_client_command(
    format: &OutputFormat,
    clients: &ClientLifecycleManager,
    ctx: &RequestContext,
    command: ClientCommand,
) -> Result<()> {
    match command {
        ClientCommand::List => output_response(format, &clients.list_active(ctx).await?),
        ClientCommand::Get(args) => {
            output_response(format, &clients.get(ctx, &args.client_id).await?)
        }
        ClientCommand::Owned(args) => output_response(
            format,
            &clients.list_by_owner(ctx, &args.owner_id).await?,
        ),
        ClientCommand::Create(args) => {
            let owner_id = UserId::parse(&args.owner_id)
                .with_context(|| format!("Invalid owner id: {}", args.owner_id))?;
            let payload = NewClient {
                client_name: args.name,
                client_uri: args.client_uri,
                redirect_uri: args.redirect_uri,
                expired_at: args.expired_at,
            };
            output_response(format, &clients.create(ctx, owner_id, payload).await?)
        }
        ClientCommand::Update(args) => {
            let patch = ClientPatch {
                client_name: args.name,
                client_uri: args.client_uri,
                redirect_uri: args.redirect_uri,
                expired_at: args.expired_at,
            };
            let updated = clients.update(ctx, &args.client_id, patch).await?;
            output_outcome(format, updated, "Client updated")
        }
        ClientCommand::Delete(args) => {
            clients.delete(ctx, &args.client_id).await?;
            output_outcome(format, true, "Client deleted")
        }
        ClientCommand::Enable(args) => {
            let updated = clients
                .set_expiration(ctx, &args.client_id, ExpirationAction::Enable, args.expired_at)
                .await?;
            output_outcome(format, updated, "Client enabled")
        }
        ClientCommand::Disable(args) => {
            let updated = clients
                .set_expiration(ctx, &args.client_id, ExpirationAction::Disable, None)
                .await?;
            output_outcome(format, updated, "Client disabled")
        }
    }
}

async fn run_user_command(
    format: &OutputFormat,
    users: &UserAccountManager,
    ctx: &RequestContext,
    command: UserCommand,
) -> Result<()> {
    match command {
        UserCommand::List => output_response(format, &users.list_active(ctx).await?),
        UserCommand::Get(args) => {
            let projection = if args.with_password {
                UserProjection::WithPassword
            } else {
                UserProjection::WithoutPassword
            };
            output_response(format, &users.get(ctx, &args.user_id, projection).await?)
        }
        UserCommand::Create(args) => {
            let payload = NewUser {
                name: args.name,
                email: args.email,
                password: args.password,
                institution: args.institution,
                occupation: args.occupation,
            };
            output_response(format, &users.create(ctx, payload).await?)
        }
        UserCommand::Update(args) => {
            let patch = UserPatch {
                name: args.name,
                institution: args.institution,
                occupation: args.occupation,
            };
            let updated = users.update(ctx, &args.user_id, patch).await?;
            output_outcome(format, updated, "User updated")
        }
        UserCommand::Delete(args) => {
            users.delete(ctx, &args.user_id).await?;
            output_outcome(format, true, "User deleted")
        }
        UserCommand::ChangePassword(args) => {
            let change = PasswordChange {
                current_password: args.current_password,
                new_password: args.new_password,
            };
            let changed = users.change_password(ctx, &args.user_id, change).await?;
            output_outcome(format, changed, "Password changed")
        }
        UserCommand::Authorize(args) => {
            let authorized = users
                .authorize_client(ctx, &args.user_id, &args.client_id)
                .await?;
            output_outcome(format, authorized, "Client authorized")
        }
        UserCommand::Clients(args) => output_response(
            format,
            &users.list_authorized_clients(ctx, &args.user_id).await?,
        ),
    }
}

/// Report a boolean write outcome; a write that did not land exits non-zero
fn output_outcome(format: &OutputFormat, success: bool, message: &str) -> Result<()> {
    if !success {
        anyhow::bail!("{} failed: the store did not accept the write", message);
    }
    output_response(format, &json!({ "message": message }))
}

/// Output response data in the requested format
fn output_response<T: Serialize>(format: &OutputFormat, data: &T) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(data)?);
        }
        OutputFormat::JsonPretty => {
            println!("{}", serde_json::to_string_pretty(data)?);
        }
    }
    Ok(())
}
