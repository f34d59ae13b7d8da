use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use storefront_orders::{
    auth::{build_session_store, AuthConfig, AuthService},
    config::{self, AppConfig},
    db::{self, DbPool},
    events,
    services::{commerce::SeaOrmCartSource, orders::OrderResponse, orders::OrderService},
};
use tracing::{debug, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Migrate => {
            db::run_migrations(&context.db)
                .await
                .context("failed to apply migrations")?;
            println!("Migrations applied");
        }
        Commands::IssueToken(args) => handle_issue_token(&context, args, cli.json).await?,
        Commands::RevokeSessions(args) => handle_revoke_sessions(&context, args).await?,
        Commands::Orders(OrdersCommands::List) => handle_list_orders(&context, cli.json).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(
    name = "storefront-cli",
    about = "Operator tooling for the storefront orders service",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply the embedded schema migrations
    Migrate,
    /// Mint a bearer token against the configured session store
    IssueToken(IssueTokenArgs),
    /// Revoke the live session of a user
    RevokeSessions(RevokeSessionsArgs),
    #[command(subcommand)]
    Orders(OrdersCommands),
}

#[derive(Args)]
struct IssueTokenArgs {
    #[arg(long, help = "User id to place in the token subject")]
    user_id: i32,
    #[arg(long = "role", help = "Role to grant; repeat for several")]
    roles: Vec<String>,
}

#[derive(Args)]
struct RevokeSessionsArgs {
    #[arg(long)]
    user_id: i32,
}

#[derive(Subcommand)]
enum OrdersCommands {
    /// Print every order, newest first
    List,
}

struct CliContext {
    config: AppConfig,
    db: Arc<DbPool>,
    auth_service: Arc<AuthService>,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let db_pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;
        let db = Arc::new(db_pool);

        let auth_config = AuthConfig::new(config.jwt_secret.clone());
        let sessions = build_session_store(&config, auth_config.token_lifetime).await;
        let auth_service = Arc::new(AuthService::new(auth_config, sessions));

        Ok(Self {
            config,
            db,
            auth_service,
        })
    }

    fn order_service(&self) -> OrderService {
        // Read-only use; queued events are simply logged
        let (sender, mut rx) = events::channel(8);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                debug!(target: "storefront_cli", event = ?event, "received async event");
            }
        });
        OrderService::new(self.db.clone(), Arc::new(SeaOrmCartSource::new()), sender)
    }

    fn warn_if_process_local_sessions(&self) {
        if !self.config.uses_redis_sessions() {
            warn!("Session store is in-memory; the running server will not see this change");
        }
    }
}

async fn handle_issue_token(context: &CliContext, args: IssueTokenArgs, json: bool) -> Result<()> {
    context.warn_if_process_local_sessions();

    let issued = context
        .auth_service
        .issue_token(args.user_id, args.roles)
        .await
        .context("failed to issue token")?;

    if json {
        print_json(&issued)?;
    } else {
        println!("{}", issued.token);
        println!("token id: {}", issued.token_id);
        println!("expires:  {}", issued.expires_at.to_rfc3339());
    }
    Ok(())
}

async fn handle_revoke_sessions(context: &CliContext, args: RevokeSessionsArgs) -> Result<()> {
    context.warn_if_process_local_sessions();

    match context
        .auth_service
        .force_invalidate_all(args.user_id)
        .await
        .context("failed to revoke sessions")?
    {
        Some(token_id) => println!("Revoked token {} for user {}", token_id, args.user_id),
        None => println!("User {} has no live session", args.user_id),
    }
    Ok(())
}

async fn handle_list_orders(context: &CliContext, json: bool) -> Result<()> {
    let orders = context
        .order_service()
        .admin_list_orders()
        .await
        .context("failed to list orders")?;

    if json {
        print_json(&orders)?;
    } else if orders.is_empty() {
        println!("No orders");
    } else {
        orders.iter().for_each(render_order);
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_order(order: &OrderResponse) {
    println!(
        "- Order {} ({}) • user {} • status {} • payment {} • total {} • {} item(s)",
        order.order_number,
        order.id,
        order.user_id,
        order.status,
        order.payment_status,
        order.total,
        order.items.len()
    );
}
