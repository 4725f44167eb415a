//! Shopfront CLI - drive the session, cart, and favorites engine from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Sign in (password from SHOPFRONT_PASSWORD if -p is omitted)
//! shop login -e ada@example.com
//!
//! # Show the current identity, confirmed against the API
//! shop whoami
//!
//! # Check whether a route would render
//! shop route /admin/orders
//!
//! # Cart and favorites
//! shop cart add 42
//! shop cart set 42 3
//! shop favorites move 17
//! shop cart list
//! ```
//!
//! # Environment Variables
//!
//! - `SHOPFRONT_API_URL` - REST API root (required)
//! - `SHOPFRONT_DATA_DIR` - where the token, cart, and favorites are kept
//! - `RUST_LOG` - log filter (default: `shopfront_client=info,shopfront_cli=info`)

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

use shopfront_client::ClientError;
use shopfront_client::config::ClientConfig;
use shopfront_client::state::AppState;
use shopfront_client::telemetry;

mod commands;

#[derive(Parser)]
#[command(name = "shop")]
#[command(author, version, about = "Shopfront session, cart, and favorites")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long, env = "SHOPFRONT_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and forget the stored token
    Logout,
    /// Show the signed-in identity
    Whoami {
        /// Skip the profile round trip
        #[arg(long)]
        offline: bool,
    },
    /// Check how the route guard treats a path
    Route {
        /// Path to check, e.g. /admin/orders
        path: String,
    },
    /// Manage the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Manage favorites
    Favorites {
        #[command(subcommand)]
        action: FavoritesAction,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// List cart lines with product details
    List,
    /// Add one of a product
    Add {
        /// Product id
        id: String,
    },
    /// Increase a line's quantity by one
    Inc {
        /// Product id
        id: String,
    },
    /// Decrease a line's quantity by one (never below 1)
    Dec {
        /// Product id
        id: String,
    },
    /// Set a line's quantity (0 removes it)
    Set {
        /// Product id
        id: String,
        /// New quantity
        quantity: u32,
    },
    /// Remove a line
    Remove {
        /// Product id
        id: String,
    },
    /// Empty the cart
    Clear,
}

#[derive(Subcommand)]
enum FavoritesAction {
    /// List favorites with product details
    List,
    /// Add a product to favorites
    Add {
        /// Product id
        id: String,
    },
    /// Remove a product from favorites
    Remove {
        /// Product id
        id: String,
    },
    /// Move a favorite into the cart
    Move {
        /// Product id
        id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            #[allow(clippy::print_stderr)]
            {
                eprintln!("Configuration error: {e}");
            }
            std::process::exit(2);
        }
    };

    let _sentry_guard = telemetry::init(&config, "shopfront_client=info,shopfront_cli=info");

    if let Err(e) = run(cli, config).await {
        e.report();
        #[allow(clippy::print_stderr)]
        {
            eprintln!("Error: {e}");
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: ClientConfig) -> Result<(), ClientError> {
    let mut app = AppState::new(config)?;

    match cli.command {
        Commands::Login { email, password } => {
            commands::session::login(&app, &email, &password).await?;
        }
        Commands::Logout => commands::session::logout(&app),
        Commands::Whoami { offline } => commands::session::whoami(&app, offline).await,
        Commands::Route { path } => commands::session::route(&app, &path),
        Commands::Cart { action } => match action {
            CartAction::List => commands::cart::list(&app).await?,
            CartAction::Add { id } | CartAction::Inc { id } => {
                commands::cart::increment(&mut app, &id)?;
            }
            CartAction::Dec { id } => commands::cart::decrement(&mut app, &id)?,
            CartAction::Set { id, quantity } => {
                commands::cart::set_quantity(&mut app, &id, quantity)?;
            }
            CartAction::Remove { id } => commands::cart::remove(&mut app, &id)?,
            CartAction::Clear => commands::cart::clear(&mut app)?,
        },
        Commands::Favorites { action } => match action {
            FavoritesAction::List => commands::favorites::list(&app).await?,
            FavoritesAction::Add { id } => commands::favorites::add(&mut app, &id)?,
            FavoritesAction::Remove { id } => commands::favorites::remove(&mut app, &id)?,
            FavoritesAction::Move { id } => commands::favorites::move_to_cart(&mut app, &id)?,
        },
    }
    Ok(())
}
