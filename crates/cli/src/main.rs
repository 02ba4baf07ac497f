//! Reboul CLI - Drive the storefront session and cart from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Log in (password read from stdin)
//! reboul login marie@example.com
//!
//! # Add two units of a product
//! reboul cart add sku-veste-noire --price 189.00 --name "Veste noire" -q 2
//!
//! # Show the cart
//! reboul cart show
//!
//! # Log out
//! reboul logout
//! ```
//!
//! # Commands
//!
//! - `login` / `logout` / `whoami` - Session management
//! - `cart show|add|update|remove|clear|refresh` - Cart management
//!
//! State is kept in `REBOUL_STATE_PATH` between runs.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use reboul_storefront::{Storefront, StorefrontConfig};
use rust_decimal::Decimal;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "reboul")]
#[command(author, version, about = "Reboul storefront client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with email and password
    Login {
        /// Account email address
        email: String,
    },
    /// Log out and forget the saved session and cart
    Logout,
    /// Show the logged-in customer
    Whoami {
        /// Confirm the session with the server
        #[arg(long)]
        verify: bool,
    },
    /// Manage the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// List cart lines and the subtotal
    Show,
    /// Add units of a product
    Add {
        /// Product item key
        item_key: String,

        /// Units to add
        #[arg(short, long, default_value_t = 1)]
        quantity: i64,

        /// Unit price in euros
        #[arg(short, long)]
        price: Decimal,

        /// Product name
        #[arg(short, long, default_value = "")]
        name: String,

        /// Product image URL
        #[arg(long)]
        image: Option<String>,
    },
    /// Set a line's quantity (0 removes it)
    Update {
        /// Product item key
        item_key: String,

        /// New quantity
        #[arg(allow_hyphen_values = true)]
        quantity: i64,
    },
    /// Remove a line
    Remove {
        /// Product item key
        item_key: String,
    },
    /// Empty the cart
    Clear,
    /// Reload the cart from the server
    Refresh,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load configuration from environment (needed for Sentry init)
    let config = match StorefrontConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing_subscriber::fmt::init();
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(2);
        }
    };

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "reboul_storefront=info,reboul_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli, &config).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &StorefrontConfig) -> Result<(), Box<dyn std::error::Error>> {
    let storefront = Storefront::from_config(config)?;
    let mut notifications = storefront.notifications();
    storefront.restore_session().await;

    let result = match cli.command {
        Commands::Login { email } => commands::session::login(&storefront, &email).await,
        Commands::Logout => {
            commands::session::logout(&storefront).await;
            Ok(())
        }
        Commands::Whoami { verify } => commands::session::whoami(&storefront, verify).await,
        Commands::Cart { action } => match action {
            CartAction::Show => {
                commands::cart::show(&storefront.cart_snapshot());
                Ok(())
            }
            CartAction::Add {
                item_key,
                quantity,
                price,
                name,
                image,
            } => commands::cart::add(&storefront, &item_key, quantity, price, name, image).await,
            CartAction::Update { item_key, quantity } => {
                commands::cart::update(&storefront, &item_key, quantity).await
            }
            CartAction::Remove { item_key } => commands::cart::remove(&storefront, &item_key).await,
            CartAction::Clear => {
                storefront.clear_cart().await;
                commands::cart::show(&storefront.cart_snapshot());
                Ok(())
            }
            CartAction::Refresh => commands::cart::refresh(&storefront).await,
        },
    };

    commands::print_notifications(&mut notifications);
    result
}
