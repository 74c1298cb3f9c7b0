//! StaxTrade CLI - catalog, cart, inventory, and dashboard views.
//!
//! # Usage
//!
//! ```bash
//! # Sign in (prompts for the password)
//! stx login -u alice
//!
//! # Browse the catalog and fill the cart
//! stx catalog
//! stx cart add 3 --quantity 2
//! stx order place
//!
//! # Watch the dashboard until Ctrl+C
//! stx dashboard --watch
//! ```
//!
//! # Commands
//!
//! - `login`, `register`, `logout`, `status`, `mode` - Session and portal mode
//! - `catalog`, `cart`, `order` - Customer portal
//! - `products`, `brands` - Product management
//! - `dashboard`, `forecast`, `insights` - Analytics

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use staxtrade_client::{ClientConfig, StaxTradeClient, Topic};
use staxtrade_core::{BrandId, PortalMode, ProductId};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "stx")]
#[command(author, version, about = "StaxTrade command-line client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and store the session
    Login {
        #[arg(short, long)]
        username: String,
    },
    /// Create an account
    Register {
        #[arg(short, long)]
        username: String,
    },
    /// Forget the stored session (the cart is kept)
    Logout,
    /// Show session, portal mode, and cart summary
    Status,
    /// Show or switch the portal mode
    Mode {
        /// `admin` or `customer`; toggles when omitted
        mode: Option<PortalMode>,
    },
    /// List the customer catalog with your prices
    Catalog,
    /// Inspect or change the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Place or list orders
    Order {
        #[command(subcommand)]
        action: OrderAction,
    },
    /// Manage products
    Products {
        #[command(subcommand)]
        action: ProductAction,
    },
    /// List brands
    Brands,
    /// Show the analytics dashboard
    Dashboard {
        /// Keep refreshing until Ctrl+C
        #[arg(short, long)]
        watch: bool,

        /// Seconds between refreshes (default: `STAXTRADE_POLL_INTERVAL_SECS`)
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Show the demand forecast
    Forecast {
        /// Days of sales history to learn from
        #[arg(long, default_value_t = 30)]
        window: u32,

        /// Days ahead to project
        #[arg(long, default_value_t = 30)]
        horizon: u32,
    },
    /// Show restock recommendations
    Insights {
        #[arg(long, default_value_t = 30)]
        window: u32,

        #[arg(long, default_value_t = 30)]
        horizon: u32,

        /// Maximum number of rows
        #[arg(long, default_value_t = staxtrade_client::api::DEFAULT_INSIGHTS_LIMIT)]
        limit: u32,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Show cart lines and total
    Show,
    /// Add a catalog product
    Add {
        product_id: ProductId,
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Increase a line by one
    Inc { product_id: ProductId },
    /// Decrease a line by one (removing it at zero)
    Dec { product_id: ProductId },
    /// Remove a line
    Remove { product_id: ProductId },
    /// Empty the cart
    Clear,
}

#[derive(Subcommand)]
enum OrderAction {
    /// Submit the cart as an order
    Place,
    /// List your orders
    List,
}

#[derive(Subcommand)]
enum ProductAction {
    /// List products
    List {
        /// Match name or brand name
        #[arg(short, long)]
        search: Option<String>,

        #[arg(short, long)]
        brand: Option<BrandId>,

        #[arg(short, long)]
        page: Option<u32>,
    },
    /// Create a product
    Create {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        brand: BrandId,
        #[arg(short, long)]
        price: rust_decimal::Decimal,
        #[arg(short, long, default_value_t = staxtrade_core::ProductInput::DEFAULT_STOCK)]
        stock: u32,
    },
    /// Replace a product's fields
    Update {
        id: ProductId,
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        brand: BrandId,
        #[arg(short, long)]
        price: rust_decimal::Decimal,
        #[arg(short, long)]
        stock: u32,
    },
    /// Delete a product
    Delete { id: ProductId },
    /// Add to (or with a negative amount, remove from) stock
    AdjustStock {
        id: ProductId,
        #[arg(allow_negative_numbers = true)]
        amount: i64,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Map tracing levels to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        tracing::Level::TRACE => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "staxtrade_cli=info,staxtrade_client=info".into());
    let json = std::env::var("STAXTRADE_LOG_FORMAT").is_ok_and(|format| format == "json");

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter));

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing();
            tracing::error!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    let _sentry_guard = init_sentry(&config);
    init_tracing();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli, config).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let client = StaxTradeClient::new(config)?;

    let _session_expired = client
        .events()
        .subscribe(Topic::SessionExpired, |_| commands::notify_session_expired());

    match cli.command {
        Commands::Login { username } => commands::auth::login(&client, &username).await?,
        Commands::Register { username } => commands::auth::register(&client, &username).await?,
        Commands::Logout => commands::auth::logout(&client).await?,
        Commands::Status => commands::auth::status(&client),
        Commands::Mode { mode } => commands::auth::mode(&client, mode)?,
        Commands::Catalog => commands::shop::catalog(&client).await?,
        Commands::Cart { action } => match action {
            CartAction::Show => commands::shop::show_cart(&client),
            CartAction::Add {
                product_id,
                quantity,
            } => commands::shop::add(&client, product_id, quantity).await?,
            CartAction::Inc { product_id } => {
                commands::shop::change(&client, product_id, 1)?;
            }
            CartAction::Dec { product_id } => {
                commands::shop::change(&client, product_id, -1)?;
            }
            CartAction::Remove { product_id } => commands::shop::remove(&client, product_id)?,
            CartAction::Clear => commands::shop::clear(&client)?,
        },
        Commands::Order { action } => match action {
            OrderAction::Place => commands::shop::place_order(&client).await?,
            OrderAction::List => commands::shop::list_orders(&client).await?,
        },
        Commands::Products { action } => match action {
            ProductAction::List {
                search,
                brand,
                page,
            } => commands::products::list(&client, search, brand, page).await?,
            ProductAction::Create {
                name,
                brand,
                price,
                stock,
            } => commands::products::create(&client, name, brand, price, stock).await?,
            ProductAction::Update {
                id,
                name,
                brand,
                price,
                stock,
            } => commands::products::update(&client, id, name, brand, price, stock).await?,
            ProductAction::Delete { id } => commands::products::delete(&client, id).await?,
            ProductAction::AdjustStock { id, amount } => {
                commands::products::adjust_stock(&client, id, amount).await?;
            }
        },
        Commands::Brands => commands::products::brands(&client).await?,
        Commands::Dashboard { watch, interval } => {
            commands::analytics::dashboard(&client, watch, interval).await?;
        }
        Commands::Forecast { window, horizon } => {
            commands::analytics::forecast(&client, window, horizon).await?;
        }
        Commands::Insights {
            window,
            horizon,
            limit,
        } => commands::analytics::insights(&client, window, horizon, limit).await?,
    }
    Ok(())
}
