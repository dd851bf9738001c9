//! `OpsInbox` - Gmail triage backend with a deterministic classifier
//!
//! ## Commands
//!
//! - `login` / `logout` / `status`: Google OAuth session management
//! - `triage`: classify a page of the inbox
//! - `messages` / `message`: raw Gmail listing and detail
//! - `override` / `overrides` / `inbox`: per-message annotations
//! - `rules`: admin-configurable triage rules
//! - `flags`: feature flags (AI shadow triage)

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::io::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use opsinbox_core::{Priority, RuleConfig, TriagePage, TriageRepository, TriageService};
use opsinbox_gmail::GmailClient;
use opsinbox_oauth::{AuthorizationCodeFlow, OAuthClient, Provider, Token, TokenStore};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "opsinbox")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Gmail triage backend with a deterministic classifier", long_about = None)]
struct Cli {
    /// Path to the SQLite database (defaults to the platform data dir)
    #[arg(long, env = "OPSINBOX_DB_PATH", global = true)]
    db_path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate with Google and store the OAuth token
    Login {
        /// OAuth client id
        #[arg(long, env = "GOOGLE_CLIENT_ID")]
        client_id: String,

        /// OAuth client secret (omit for public clients)
        #[arg(long, env = "GOOGLE_CLIENT_SECRET")]
        client_secret: Option<String>,

        /// Redirect URI registered for the client
        #[arg(long, env = "GOOGLE_REDIRECT_URI", default_value = "http://localhost:8085")]
        redirect_uri: String,

        /// Print the consent URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Drop the stored OAuth token
    Logout,

    /// Show authentication status
    Status,

    /// Classify a page of the inbox
    Triage {
        /// Messages per page
        #[arg(short, long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..=100))]
        limit: u32,

        /// Continuation token from a previous page
        #[arg(long)]
        page_token: Option<String>,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List raw message metadata
    Messages {
        /// Messages per page
        #[arg(short, long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..=100))]
        limit: u32,

        /// Continuation token from a previous page
        #[arg(long)]
        page_token: Option<String>,
    },

    /// Show one message in full
    Message {
        /// Gmail message id
        id: String,
    },

    /// Record an override on a message
    Override {
        /// Gmail message id
        id: String,

        /// Mark the message handled
        #[arg(long)]
        done: bool,

        /// Attach a note
        #[arg(long, default_value = "")]
        note: String,

        /// Attach a tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// List every recorded override
    Overrides,

    /// Shared team inbox view of overrides
    Inbox,

    /// Manage triage rules
    Rules {
        #[command(subcommand)]
        command: Option<RulesCommand>,
    },

    /// Manage feature flags
    Flags {
        #[command(subcommand)]
        command: Option<FlagsCommand>,
    },
}

#[derive(Subcommand)]
enum RulesCommand {
    /// List configured rules
    List,

    /// Add a rule
    Add {
        /// Short display name
        #[arg(long)]
        name: String,

        /// What the rule is for
        #[arg(long)]
        description: String,

        /// Priority assigned to matches (P0-P3)
        #[arg(long)]
        priority: String,

        /// Category assigned to matches
        #[arg(long)]
        category: String,

        /// Keyword matcher (repeatable, at least one)
        #[arg(long = "matcher", required = true)]
        matchers: Vec<String>,

        /// Create the rule disabled
        #[arg(long)]
        disabled: bool,
    },
}

#[derive(Subcommand)]
enum FlagsCommand {
    /// Show current flags
    Show,

    /// Toggle AI shadow triage
    SetAi {
        /// true to enable, false to disable
        enabled: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "opsinbox=debug,opsinbox_core=debug,opsinbox_gmail=debug,opsinbox_oauth=debug"
    } else {
        "opsinbox=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db_path = resolve_db_path(cli.db_path)?;
    let repository = TriageRepository::new(&db_path).await?;
    let store = TokenStore::new();

    match cli.command {
        Commands::Login {
            client_id,
            client_secret,
            redirect_uri,
            no_browser,
        } => {
            login(
                &repository,
                &store,
                client_id,
                client_secret,
                redirect_uri,
                no_browser,
            )
            .await
        }
        Commands::Logout => logout(&repository, &store).await,
        Commands::Status => status(&store),
        Commands::Triage {
            limit,
            page_token,
            json,
        } => triage(repository, &store, limit, page_token.as_deref(), json).await,
        Commands::Messages { limit, page_token } => {
            messages(&store, limit, page_token.as_deref()).await
        }
        Commands::Message { id } => message(&store, &id).await,
        Commands::Override {
            id,
            done,
            note,
            tags,
        } => set_override(&repository, &id, done, &note, &tags).await,
        Commands::Overrides => overrides(&repository).await,
        Commands::Inbox => inbox(&repository).await,
        Commands::Rules { command } => match command.unwrap_or(RulesCommand::List) {
            RulesCommand::List => list_rules(&repository).await,
            RulesCommand::Add {
                name,
                description,
                priority,
                category,
                matchers,
                disabled,
            } => {
                add_rule(
                    &repository,
                    name,
                    description,
                    &priority,
                    category,
                    matchers,
                    disabled,
                )
                .await
            }
        },
        Commands::Flags { command } => match command.unwrap_or(FlagsCommand::Show) {
            FlagsCommand::Show => show_flags(&repository).await,
            FlagsCommand::SetAi { enabled } => set_ai_flag(&repository, enabled).await,
        },
    }
}

/// Resolves the database path, creating its parent directory.
fn resolve_db_path(explicit: Option<PathBuf>) -> Result<String> {
    let path = match explicit {
        Some(path) => path,
        None => dirs::data_dir()
            .context("No platform data directory; pass --db-path")?
            .join("opsinbox")
            .join("opsinbox.db"),
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(path.display().to_string())
}

/// Loads the stored token, refreshing it through the OAuth client when it
/// has expired. Bails when no session exists.
async fn authenticated_token(store: &TokenStore) -> Result<Token> {
    let Some(token) = store.load()? else {
        bail!("Not authenticated with Google OAuth. Run `opsinbox login` first.");
    };

    if !token.is_expired() {
        return Ok(token);
    }

    let client_id = std::env::var("GOOGLE_CLIENT_ID")
        .context("Stored token expired and GOOGLE_CLIENT_ID is not set; cannot refresh")?;
    let client_secret = std::env::var("GOOGLE_CLIENT_SECRET").ok();

    let mut client = OAuthClient::new(client_id, Provider::google()?);
    if let Some(secret) = client_secret {
        client = client.with_client_secret(secret);
    }

    info!("Refreshing expired access token");
    let refreshed = client.refresh_token(&token).await?;
    let merged = refreshed.merged_for_persistence(Some(&token), None);
    store.save(&merged)?;
    Ok(merged)
}

async fn login(
    repository: &TriageRepository,
    store: &TokenStore,
    client_id: String,
    client_secret: Option<String>,
    redirect_uri: String,
    no_browser: bool,
) -> Result<()> {
    let mut client =
        OAuthClient::new(client_id, Provider::google()?).with_redirect_uri(redirect_uri);
    if let Some(secret) = client_secret {
        client = client.with_client_secret(secret);
    }
    let flow = AuthorizationCodeFlow::new(client).with_pkce();
    let url = flow.authorization_url(None)?;

    println!("Authorize OpsInbox in your browser:\n\n  {url}\n");
    if !no_browser && opener::open(url.as_str()).is_err() {
        println!("(could not open a browser; visit the URL above)");
    }

    print!("Paste the `code` parameter from the redirect URL: ");
    std::io::stdout().flush()?;
    let mut code = String::new();
    std::io::stdin().read_line(&mut code)?;
    let code = code.trim();
    if code.is_empty() {
        bail!("No authorization code provided");
    }

    let token = flow.exchange_code(code).await?;
    let merged = token.merged_for_persistence(None, store.load()?.as_ref());
    let has_refresh = merged.refresh_token.is_some();
    store.save(&merged)?;

    repository
        .log_activity(
            "auth_oauth_success",
            &json!({ "hasRefreshToken": has_refresh }),
        )
        .await?;
    println!("Logged in. Refresh token stored: {has_refresh}");
    Ok(())
}

async fn logout(repository: &TriageRepository, store: &TokenStore) -> Result<()> {
    store.clear()?;
    repository.log_activity("auth_logout", &json!({})).await?;
    println!("Logged out.");
    Ok(())
}

fn status(store: &TokenStore) -> Result<()> {
    match store.load()? {
        Some(token) => {
            println!("authenticated:  true");
            println!("token expired:  {}", token.is_expired());
            println!("refresh token:  {}", token.refresh_token.is_some());
        }
        None => println!("authenticated:  false"),
    }
    Ok(())
}

async fn triage(
    repository: TriageRepository,
    store: &TokenStore,
    limit: u32,
    page_token: Option<&str>,
    as_json: bool,
) -> Result<()> {
    let token = authenticated_token(store).await?;
    let client = GmailClient::new(token.access_token);
    let service = TriageService::new(repository);

    let page = service.triage_page(&client, limit, page_token).await?;
    service
        .repository()
        .log_activity(
            "triage_page",
            &json!({ "limit": limit, "count": page.items.len() }),
        )
        .await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    print_triage_table(&page);
    Ok(())
}

fn print_triage_table(page: &TriagePage) {
    println!(
        "{:<4} {:<12} {:<6} {:<40} {}",
        "pri", "category", "conf", "subject", "from"
    );
    for item in &page.items {
        let done = item.r#override.as_ref().is_some_and(|o| o.done);
        println!(
            "{:<4} {:<12} {:<6.2} {:<40} {}{}",
            item.triage.priority,
            item.triage.category,
            item.triage.confidence,
            truncate(&item.email.subject, 40),
            truncate(&item.email.from, 40),
            if done { "  [done]" } else { "" },
        );
    }
    if let Some(token) = &page.next_page_token {
        println!("\nnext page: --page-token {token}");
    }
}

async fn messages(store: &TokenStore, limit: u32, page_token: Option<&str>) -> Result<()> {
    let token = authenticated_token(store).await?;
    let client = GmailClient::new(token.access_token);

    let page = client.list_messages(limit, page_token).await?;
    for meta in &page.items {
        println!(
            "{}  {:<40} {}",
            meta.id,
            truncate(&meta.subject, 40),
            meta.from
        );
    }
    if let Some(token) = &page.next_page_token {
        println!("\nnext page: --page-token {token}");
    }
    Ok(())
}

async fn message(store: &TokenStore, id: &str) -> Result<()> {
    let token = authenticated_token(store).await?;
    let client = GmailClient::new(token.access_token);

    let detail = client.get_message(id).await?;
    for (name, value) in &detail.headers {
        println!("{name}: {value}");
    }
    println!();
    match &detail.plain_text_body {
        Some(body) => println!("{body}"),
        None => println!("(no text/plain body; snippet: {})", detail.snippet),
    }
    Ok(())
}

async fn set_override(
    repository: &TriageRepository,
    id: &str,
    done: bool,
    note: &str,
    tags: &[String],
) -> Result<()> {
    let saved = repository.upsert_override(id, done, note, tags).await?;
    repository
        .log_activity("override_upsert", &json!({ "messageId": id, "done": done }))
        .await?;
    println!("{}", serde_json::to_string_pretty(&saved)?);
    Ok(())
}

async fn overrides(repository: &TriageRepository) -> Result<()> {
    for (id, o) in repository.list_overrides().await? {
        println!(
            "{id}  done={}  tags=[{}]  {}",
            o.done,
            o.tags.join(", "),
            truncate(&o.note, 60),
        );
    }
    Ok(())
}

async fn inbox(repository: &TriageRepository) -> Result<()> {
    for item in repository.list_team_inbox().await? {
        println!(
            "{}  done={}  updated={}  {}",
            item.email_id,
            item.done,
            item.updated_at,
            truncate(&item.note, 60),
        );
    }
    Ok(())
}

async fn list_rules(repository: &TriageRepository) -> Result<()> {
    for rule in repository.list_rule_configs().await? {
        println!(
            "{}  [{}] {} -> {}  matchers=[{}]{}",
            rule.id,
            rule.priority,
            rule.name,
            rule.category,
            rule.matchers.join(", "),
            if rule.enabled { "" } else { "  (disabled)" },
        );
    }
    Ok(())
}

async fn add_rule(
    repository: &TriageRepository,
    name: String,
    description: String,
    priority: &str,
    category: String,
    matchers: Vec<String>,
    disabled: bool,
) -> Result<()> {
    let Some(priority) = Priority::parse_strict(priority) else {
        bail!("Invalid priority {priority:?}; expected P0, P1, P2, or P3");
    };

    let mut rule = RuleConfig {
        id: format!("rule-{}", chrono::Utc::now().timestamp_millis()),
        name,
        description,
        matchers,
        priority,
        category,
        enabled: !disabled,
    };
    rule.validate()?;

    repository.create_rule_config(&rule).await?;
    repository
        .log_activity("rule_created", &json!({ "ruleId": rule.id }))
        .await?;
    println!("Created {}", rule.id);
    Ok(())
}

async fn show_flags(repository: &TriageRepository) -> Result<()> {
    let flags = repository.feature_flags().await?;
    println!("ai triage:      {}", flags.ai_triage_enabled);
    println!("ai mode:        {}", flags.ai_mode.as_str());
    println!("safe fallback:  {}", flags.safe_fallback());
    Ok(())
}

async fn set_ai_flag(repository: &TriageRepository, enabled: bool) -> Result<()> {
    let flags = repository.set_ai_triage_enabled(enabled).await?;
    repository
        .log_activity(
            "feature_flags_updated",
            &json!({ "aiTriageEnabled": enabled }),
        )
        .await?;
    println!("ai triage is now {}", flags.ai_mode.as_str());
    Ok(())
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}\u{2026}")
    }
}
