//! # tooldex CLI (`tdx`)
//!
//! The `tdx` binary is the primary interface for tooldex. It browses the
//! catalog, manages reviews, submissions, favorites, and comparisons,
//! handles accounts, runs the back office, and starts the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! tdx --config ./config/tooldex.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tdx init` | Create the local store and seed empty collections |
//! | `tdx browse [QUERY]` | Filtered, sorted, paginated catalog page |
//! | `tdx tools show <id>` | One catalog entry in full |
//! | `tdx tools categories` | Distinct catalog categories |
//! | `tdx review ...` | Add, list, and upvote reviews |
//! | `tdx submit ...` | Propose tools and list submissions |
//! | `tdx auth ...` | Register, log in and out, show the session |
//! | `tdx fav ...` / `tdx compare ...` | Manage the local shortlists |
//! | `tdx admin ...` | Back office: users and moderation |
//! | `tdx serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! # First run
//! tdx init
//!
//! # Free image tools, most popular first
//! tdx browse "image" --pricing Free --sort popular
//!
//! # Share the current filters as a URL query
//! tdx browse --category Writing --share
//!
//! # Review tool 4 and upvote someone else's review
//! tdx review add 4 "Runs on my own GPU" --rating 5 --name Ada
//! tdx review list 4
//!
//! # Back office (first registered account owns it)
//! tdx auth register ada@example.com Ada --password secret1
//! tdx admin users
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use tooldex::admin;
use tooldex::browse;
use tooldex::catalog;
use tooldex::config::{load_config, Config};
use tooldex::favorites::{CompareSet, Favorites, COMPARE_CAP};
use tooldex::models::{Role, SubmissionStatus};
use tooldex::prefs::{PartialState, Prefs};
use tooldex::query::{PopularityBracket, PricingTier, SortOrder};
use tooldex::reviews::{self, ReviewInput};
use tooldex::server;
use tooldex::store::{self, keys, Stack};
use tooldex::submissions::{self, SubmissionInput};

/// Tooldex CLI, a local-first catalog service for an AI tools directory.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/tooldex.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "tdx",
    about = "tooldex, a local-first catalog service for an AI tools directory",
    version,
    long_about = "Tooldex keeps a static catalog of AI tools and lets you browse it with \
    stacked filters, review tools, submit new ones, and shortlist favorites and comparisons. \
    Persistence goes through a pluggable backend (local JSON store, REST API, Firestore, \
    Supabase) selected in the config file or with TOOLDEX_BACKEND."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tooldex.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the local store directory and seed empty collections.
    ///
    /// Idempotent: running it again leaves existing data alone.
    Init,

    /// Browse the catalog with stacked filters.
    ///
    /// The page resolves from explicit flags first, then `--from-url`,
    /// then stored preferences, then defaults. Filter values are
    /// persisted so the next browse starts where this one left off.
    Browse {
        /// Free-text search over names, categories, descriptions, and
        /// feature names.
        query: Option<String>,

        /// Category, or `All`.
        #[arg(long)]
        category: Option<String>,

        /// Pricing tier: All, Free, Paid, Freemium.
        #[arg(long)]
        pricing: Option<String>,

        /// Popularity bracket: All, Trending, Popular, Rising.
        #[arg(long)]
        popularity: Option<String>,

        /// Sort order: newest, popular, alphabetical.
        #[arg(long)]
        sort: Option<String>,

        /// Page number (1-based).
        #[arg(long)]
        page: Option<u32>,

        /// Print the shareable URL query for the resolved state.
        #[arg(long)]
        share: bool,

        /// Initialize state from a shared URL (or bare query string).
        #[arg(long)]
        from_url: Option<String>,

        /// Reset all filters and stored preferences first.
        #[arg(long)]
        clear: bool,
    },

    /// Catalog lookups.
    Tools {
        #[command(subcommand)]
        command: ToolsCommands,
    },

    /// Add, list, and upvote reviews.
    Review {
        #[command(subcommand)]
        command: ReviewCommands,
    },

    /// Propose new tools and track submissions.
    Submit {
        #[command(subcommand)]
        command: SubmitCommands,
    },

    /// Accounts and the current session.
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },

    /// The favorites shortlist.
    Fav {
        #[command(subcommand)]
        command: FavCommands,
    },

    /// The comparison set (at most 4 tools).
    Compare {
        #[command(subcommand)]
        command: CompareCommands,
    },

    /// Back office: user administration and moderation.
    ///
    /// Requires a signed-in admin. The first account registered in a
    /// fresh store is the admin.
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum ToolsCommands {
    /// Print one catalog entry in full.
    Show { id: i64 },
    /// List the distinct categories in the catalog.
    Categories,
}

#[derive(Subcommand)]
enum ReviewCommands {
    /// Add a review for a tool.
    Add {
        tool_id: String,
        comment: String,
        /// Star rating, 1 to 5.
        #[arg(long)]
        rating: u8,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: Option<String>,
    },
    /// List a tool's reviews, newest first.
    List {
        tool_id: String,
        /// Include hidden reviews (moderation view).
        #[arg(long)]
        all: bool,
    },
    /// Mark a review as helpful.
    Helpful { id: String },
}

#[derive(Subcommand)]
enum SubmitCommands {
    /// Submit a tool for moderation.
    Add {
        name: String,
        url: String,
        description: String,
        #[arg(long)]
        category: String,
        #[arg(long)]
        image: Option<String>,
    },
    /// List submissions, optionally by status.
    List {
        /// pending, approved, or rejected.
        #[arg(long)]
        status: Option<String>,
    },
}

#[derive(Subcommand)]
enum AuthCommands {
    /// Create an account and sign in.
    Register {
        email: String,
        name: String,
        /// Read from stdin when not given.
        #[arg(long)]
        password: Option<String>,
    },
    /// Sign in.
    Login {
        email: String,
        /// Read from stdin when not given.
        #[arg(long)]
        password: Option<String>,
    },
    /// Sign out.
    Logout,
    /// Show the signed-in user.
    Whoami,
}

#[derive(Subcommand)]
enum FavCommands {
    /// Add or remove a tool from favorites.
    Toggle { id: i64 },
    List,
    Clear,
}

#[derive(Subcommand)]
enum CompareCommands {
    /// Add a tool to the comparison set.
    Add { id: i64 },
    /// Remove a tool from the comparison set.
    Rm { id: i64 },
    List,
    Clear,
}

#[derive(Subcommand)]
enum AdminCommands {
    /// List users.
    Users {
        /// Only blocked accounts.
        #[arg(long)]
        blocked: bool,
    },
    /// Block a user.
    Block { id: String },
    /// Unblock a user.
    Unblock { id: String },
    /// Change a user's role (user or admin).
    Role { id: String, role: String },
    /// Approve a submission.
    Approve { id: String },
    /// Reject a submission.
    Reject { id: String },
    /// Hide a review from listings.
    HideReview { id: String },
    /// Show a hidden review again.
    ShowReview { id: String },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli.config)?;
    let stack = store::open(&config)?;

    match cli.command {
        Commands::Init => run_init(&config, &stack),
        Commands::Browse {
            query,
            category,
            pricing,
            popularity,
            sort,
            page,
            share,
            from_url,
            clear,
        } => {
            if clear {
                Prefs::new(stack.kv.clone()).clear();
            }
            let overrides = PartialState {
                search: query,
                category,
                pricing: parse_flag(pricing, PricingTier::parse, "pricing")?,
                popularity: parse_flag(popularity, PopularityBracket::parse, "popularity")?,
                sort: parse_flag(sort, SortOrder::parse, "sort")?,
                page: match page {
                    Some(0) => bail!("page numbers start at 1"),
                    other => other,
                },
            };
            browse::run_browse(&config, &stack, overrides, from_url.as_deref(), share).await
        }
        Commands::Tools { command } => run_tools(&config, command),
        Commands::Review { command } => run_review(&stack, command).await,
        Commands::Submit { command } => run_submit(&stack, command).await,
        Commands::Auth { command } => run_auth(&stack, command).await,
        Commands::Fav { command } => run_fav(&config, &stack, command),
        Commands::Compare { command } => run_compare(&config, &stack, command),
        Commands::Admin { command } => run_admin(&stack, command).await,
        Commands::Serve => server::run_server(&config, stack).await,
    }
}

fn parse_flag<T>(
    value: Option<String>,
    parse: fn(&str) -> Option<T>,
    what: &str,
) -> Result<Option<T>> {
    match value {
        None => Ok(None),
        Some(raw) => match parse(&raw) {
            Some(parsed) => Ok(Some(parsed)),
            None => bail!("invalid {what} value: {raw}"),
        },
    }
}

fn run_init(config: &Config, stack: &Stack) -> Result<()> {
    // Opening the stack already created the directory; seed the
    // collection keys so a fresh store lists cleanly everywhere.
    for collection in [keys::REVIEWS, keys::SUBMISSIONS, keys::USERS] {
        if stack.kv.read(collection).is_none() {
            stack
                .kv
                .write_json(collection, &Vec::<serde_json::Value>::new())
                .with_context(|| format!("failed to seed collection '{collection}'"))?;
        }
    }
    println!(
        "initialized local store at {}",
        config.storage.path.display()
    );
    Ok(())
}

fn run_tools(config: &Config, command: ToolsCommands) -> Result<()> {
    let tools = catalog::load(&config.catalog)?;
    match command {
        ToolsCommands::Show { id } => {
            let tool = match catalog::find(&tools, id) {
                Some(tool) => tool,
                None => bail!("no tool with id {id}"),
            };
            println!("{} [{}]", tool.name, tool.category);
            println!("  {}", tool.description);
            println!("  pricing:    {}", tool.pricing);
            println!("  popularity: {}", tool.popularity);
            println!("  added:      {}", tool.date_added);
            println!("  link:       {}", tool.link);
            if !tool.features.is_empty() {
                println!("  features:");
                for feature in &tool.features {
                    if feature.description.is_empty() {
                        println!("    - {}", feature.name);
                    } else {
                        println!("    - {}: {}", feature.name, feature.description);
                    }
                }
            }
        }
        ToolsCommands::Categories => {
            for category in catalog::categories(&tools) {
                println!("{category}");
            }
        }
    }
    Ok(())
}

async fn run_review(stack: &Stack, command: ReviewCommands) -> Result<()> {
    let backend = stack.backend.as_ref();
    match command {
        ReviewCommands::Add {
            tool_id,
            comment,
            rating,
            name,
            email,
        } => {
            let id = reviews::add(
                backend,
                ReviewInput {
                    tool_id,
                    rating,
                    name,
                    email,
                    comment,
                },
            )
            .await?;
            println!("review saved: {id}");
        }
        ReviewCommands::List { tool_id, all } => {
            let list = reviews::for_tool(backend, &tool_id, all).await;
            if list.is_empty() {
                println!("No reviews.");
                return Ok(());
            }
            if let Some(avg) = reviews::average_rating(&list) {
                println!("{} reviews, average {avg:.1}", list.len());
            }
            for review in &list {
                let hidden = if review.visible { "" } else { " [hidden]" };
                println!(
                    "[{}/5] {} — {} (helpful: {}){}",
                    review.rating, review.name, review.comment, review.helpful, hidden
                );
                println!("    id: {}  at: {}", review.id, review.created_at);
            }
        }
        ReviewCommands::Helpful { id } => {
            let count = reviews::mark_helpful(backend, &id).await?;
            println!("helpful: {count}");
        }
    }
    Ok(())
}

async fn run_submit(stack: &Stack, command: SubmitCommands) -> Result<()> {
    let backend = stack.backend.as_ref();
    match command {
        SubmitCommands::Add {
            name,
            url,
            description,
            category,
            image,
        } => {
            let id = submissions::submit(
                backend,
                SubmissionInput {
                    name,
                    url,
                    description,
                    category,
                    image,
                },
            )
            .await?;
            println!("submission saved: {id} (pending)");
        }
        SubmitCommands::List { status } => {
            let status = match status {
                None => None,
                Some(raw) => match SubmissionStatus::parse(&raw) {
                    Some(parsed) => Some(parsed),
                    None => bail!("invalid status: {raw}"),
                },
            };
            let list = submissions::list(backend, status).await;
            if list.is_empty() {
                println!("No submissions.");
                return Ok(());
            }
            for submission in &list {
                println!(
                    "[{}] {} — {} ({})",
                    submission.status.as_str(),
                    submission.name,
                    submission.url,
                    submission.category
                );
                println!("    id: {}", submission.id);
            }
        }
    }
    Ok(())
}

fn read_password(flag: Option<String>) -> Result<String> {
    if let Some(password) = flag {
        return Ok(password);
    }
    eprintln!("password:");
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("failed to read password from stdin")?;
    let password = input.lines().next().unwrap_or("").to_string();
    if password.is_empty() {
        bail!("empty password");
    }
    Ok(password)
}

async fn run_auth(stack: &Stack, command: AuthCommands) -> Result<()> {
    let identity = stack.identity.as_ref();
    match command {
        AuthCommands::Register {
            email,
            name,
            password,
        } => {
            let password = read_password(password)?;
            match identity.sign_up(&email, &password, &name).await {
                Ok(user) => println!("signed up as {} ({})", user.email, user.role.as_str()),
                Err(e) => bail!("{e}"),
            }
        }
        AuthCommands::Login { email, password } => {
            let password = read_password(password)?;
            match identity.sign_in(&email, &password).await {
                Ok(user) => println!("signed in as {}", user.email),
                Err(e) => bail!("{e}"),
            }
        }
        AuthCommands::Logout => {
            identity.sign_out().await?;
            println!("signed out");
        }
        AuthCommands::Whoami => match identity.current_user().await {
            Some(user) => println!("{} ({})", user.email, user.role.as_str()),
            None => println!("not signed in"),
        },
    }
    Ok(())
}

fn run_fav(config: &Config, stack: &Stack, command: FavCommands) -> Result<()> {
    let favorites = Favorites::new(stack.kv.clone());
    match command {
        FavCommands::Toggle { id } => {
            if favorites.toggle(id) {
                println!("favorited {id}");
            } else {
                println!("unfavorited {id}");
            }
        }
        FavCommands::List => {
            let ids = favorites.list();
            if ids.is_empty() {
                println!("No favorites.");
                return Ok(());
            }
            let tools = catalog::load(&config.catalog)?;
            for id in ids {
                match catalog::find(&tools, id) {
                    Some(tool) => println!("{id}: {}", tool.name),
                    None => println!("{id}: (not in catalog)"),
                }
            }
        }
        FavCommands::Clear => {
            favorites.clear();
            println!("favorites cleared");
        }
    }
    Ok(())
}

fn run_compare(config: &Config, stack: &Stack, command: CompareCommands) -> Result<()> {
    let compare = CompareSet::new(stack.kv.clone());
    match command {
        CompareCommands::Add { id } => {
            if compare.add(id) {
                println!("comparing {id} ({}/{COMPARE_CAP})", compare.list().len());
            } else if compare.contains(id) {
                println!("{id} is already in the comparison set");
            } else {
                println!("comparison set is full ({COMPARE_CAP} tools)");
            }
        }
        CompareCommands::Rm { id } => {
            compare.remove(id);
            println!("removed {id}");
        }
        CompareCommands::List => {
            let ids = compare.list();
            if ids.is_empty() {
                println!("Nothing to compare.");
                return Ok(());
            }
            let tools = catalog::load(&config.catalog)?;
            for id in ids {
                match catalog::find(&tools, id) {
                    Some(tool) => println!(
                        "{id}: {} [{}] pop {} — {}",
                        tool.name, tool.category, tool.popularity, tool.pricing
                    ),
                    None => println!("{id}: (not in catalog)"),
                }
            }
        }
        CompareCommands::Clear => {
            compare.clear();
            println!("comparison set cleared");
        }
    }
    Ok(())
}

async fn run_admin(stack: &Stack, command: AdminCommands) -> Result<()> {
    admin::require_admin(stack.identity.as_ref()).await?;
    let backend = stack.backend.as_ref();

    match command {
        AdminCommands::Users { blocked } => {
            let users = admin::list_users(backend, blocked).await;
            if users.is_empty() {
                println!("No users.");
                return Ok(());
            }
            for user in &users {
                println!(
                    "{}  {}  {}  {}  {}",
                    user.id,
                    user.email,
                    user.role.as_str(),
                    user.status.as_str(),
                    user.name
                );
            }
        }
        AdminCommands::Block { id } => {
            admin::block(backend, &id).await?;
            println!("blocked {id}");
        }
        AdminCommands::Unblock { id } => {
            admin::unblock(backend, &id).await?;
            println!("unblocked {id}");
        }
        AdminCommands::Role { id, role } => {
            let role = match Role::parse(&role) {
                Some(role) => role,
                None => bail!("role must be user or admin"),
            };
            admin::set_user_role(backend, &id, role).await?;
            println!("role updated");
        }
        AdminCommands::Approve { id } => {
            submissions::approve(backend, &id).await?;
            println!("approved {id}");
        }
        AdminCommands::Reject { id } => {
            submissions::reject(backend, &id).await?;
            println!("rejected {id}");
        }
        AdminCommands::HideReview { id } => {
            reviews::set_visible(backend, &id, false).await?;
            println!("hidden {id}");
        }
        AdminCommands::ShowReview { id } => {
            reviews::set_visible(backend, &id, true).await?;
            println!("visible {id}");
        }
    }
    Ok(())
}
