//! followwatch CLI - track following/followers changes for one or more accounts.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use followwatch::{
    credentials_from_env, load_all, FileCredentialRefresher, RunResult, StateStore, WatchCycle,
};
use harvest::config::{
    DEFAULT_BASE_URL, DEFAULT_FALLBACK_PAGE_SIZE, DEFAULT_GRAPHQL_URL, DEFAULT_MAX_PAGES,
    DEFAULT_MAX_RETRIES, DEFAULT_PAGE_SIZE, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_RETRY_DELAY_SECS,
};
use harvest::{AuthBundle, Endpoint, FallbackTrigger, FetchConfig, PaginatedFetcher};
use reconcile::{AccountState, Relation, ShrinkGuard, SnapshotReconciler, UserRecord};

/// followwatch - harvest following/followers lists and report who unfollowed.
#[derive(Parser)]
#[command(name = "followwatch")]
#[command(about = "Track following/followers changes between runs")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding one state file per account
    #[arg(long, global = true, env = "FOLLOWWATCH_STATE_DIR", default_value = "./state")]
    state_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one fetch-and-reconcile cycle per account
    Run {
        #[command(flatten)]
        fetch: FetchArgs,
    },

    /// Run cycles on an interval until interrupted
    Watch {
        #[command(flatten)]
        fetch: FetchArgs,

        /// Seconds between cycles
        #[arg(long, env = "FOLLOWWATCH_INTERVAL_SECS", default_value = "3600")]
        interval: u64,
    },

    /// Print the relationship sets and removal logs of an account
    Show {
        /// Account id (all saved accounts when omitted)
        #[arg(long)]
        account: Option<String>,

        /// Only show this relation's removal log
        #[arg(long)]
        relation: Option<Relation>,

        /// Print the raw state as JSON
        #[arg(long)]
        json: bool,
    },

    /// Acknowledge a removal so it leaves the log
    Ack {
        /// Account id
        #[arg(long)]
        account: String,

        /// Which removal log
        #[arg(long)]
        relation: Relation,

        /// User id of the removed account
        #[arg(long)]
        id: String,
    },

    /// Forget an account you unfollowed yourself
    Forget {
        /// Account id
        #[arg(long)]
        account: String,

        /// User id you unfollowed
        #[arg(long)]
        id: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EndpointKind {
    /// REST friendships API
    Rest,
    /// GraphQL query API
    Graphql,
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Credential files (object or list of objects); env credentials when omitted
    #[arg(long = "credentials", env = "FOLLOWWATCH_CREDENTIALS", value_delimiter = ',')]
    credentials: Vec<PathBuf>,

    /// API family to page through
    #[arg(long, value_enum, env = "FOLLOWWATCH_ENDPOINT", default_value = "rest")]
    endpoint: EndpointKind,

    /// REST API root
    #[arg(long, env = "FOLLOWWATCH_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// GraphQL query URL
    #[arg(long, env = "FOLLOWWATCH_GRAPHQL_URL", default_value = DEFAULT_GRAPHQL_URL)]
    graphql_url: String,

    /// Records per page
    #[arg(long, env = "FOLLOWWATCH_PAGE_SIZE", default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: u32,

    /// Records per page when re-checking a suspected truncation
    #[arg(long, env = "FOLLOWWATCH_FALLBACK_PAGE_SIZE", default_value_t = DEFAULT_FALLBACK_PAGE_SIZE)]
    fallback_page_size: u32,

    /// When to re-check: never, on-exhaustion, below-expected
    #[arg(long, env = "FOLLOWWATCH_FALLBACK", default_value = "on-exhaustion")]
    fallback: FallbackTrigger,

    /// Attempts per page
    #[arg(long, env = "FOLLOWWATCH_MAX_RETRIES", default_value_t = DEFAULT_MAX_RETRIES)]
    max_retries: u32,

    /// Seconds between attempts
    #[arg(long, env = "FOLLOWWATCH_RETRY_DELAY_SECS", default_value_t = DEFAULT_RETRY_DELAY_SECS)]
    retry_delay: u64,

    /// Per-request timeout in seconds
    #[arg(long, env = "FOLLOWWATCH_REQUEST_TIMEOUT_SECS", default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    request_timeout: u64,

    /// Deadline for one list fetch in seconds
    #[arg(long, env = "FOLLOWWATCH_RUN_TIMEOUT_SECS")]
    run_timeout: Option<u64>,

    /// Cap on requests per list fetch
    #[arg(long, env = "FOLLOWWATCH_MAX_PAGES", default_value_t = DEFAULT_MAX_PAGES)]
    max_pages: usize,

    /// Reject a run whose list shrinks by more than this fraction (0.0-1.0)
    #[arg(long, env = "FOLLOWWATCH_MAX_DROP_RATIO")]
    max_drop_ratio: Option<f64>,

    /// Accept an empty list even when the previous one was not
    #[arg(long)]
    allow_empty: bool,
}

impl FetchArgs {
    fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            endpoint: match self.endpoint {
                EndpointKind::Rest => Endpoint::Friendships,
                EndpointKind::Graphql => Endpoint::graphql(),
            },
            base_url: self.base_url.clone(),
            graphql_url: self.graphql_url.clone(),
            page_size: self.page_size,
            fallback_page_size: self.fallback_page_size,
            fallback_trigger: self.fallback,
            max_retries: self.max_retries,
            retry_delay: Duration::from_secs(self.retry_delay),
            request_timeout: Duration::from_secs(self.request_timeout),
            run_timeout: self.run_timeout.map(Duration::from_secs),
            max_pages: self.max_pages,
            ..Default::default()
        }
    }

    fn shrink_guard(&self) -> Result<ShrinkGuard> {
        if let Some(ratio) = self.max_drop_ratio {
            if !(0.0..=1.0).contains(&ratio) {
                bail!("--max-drop-ratio must be between 0.0 and 1.0, got {ratio}");
            }
        }
        Ok(ShrinkGuard {
            reject_empty: !self.allow_empty,
            max_drop_ratio: self.max_drop_ratio,
        })
    }

    fn accounts(&self) -> Result<Vec<AuthBundle>> {
        if self.credentials.is_empty() {
            let bundle = credentials_from_env()
                .context("No --credentials given and environment credentials are incomplete")?;
            return Ok(vec![bundle]);
        }
        load_all(&self.credentials).context("Failed to load credentials")
    }

    fn cycle(&self, state_dir: PathBuf) -> Result<WatchCycle> {
        let mut fetcher =
            PaginatedFetcher::new(self.fetch_config()).context("Invalid fetch settings")?;
        if !self.credentials.is_empty() {
            fetcher = fetcher.with_refresher(Arc::new(FileCredentialRefresher::new(
                self.credentials.clone(),
            )));
        }
        Ok(WatchCycle::new(
            fetcher,
            SnapshotReconciler::new(self.shrink_guard()?),
            StateStore::new(state_dir),
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("followwatch=debug,harvest=debug,reconcile=debug,info")
    } else {
        EnvFilter::new("followwatch=info,harvest=info,reconcile=info,warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let store = StateStore::new(cli.state_dir.clone());

    match cli.command {
        Commands::Run { fetch } => {
            let accounts = fetch.accounts()?;
            tracing::info!(
                accounts = accounts.len(),
                state_dir = %cli.state_dir.display(),
                "Starting run"
            );
            let cycle = fetch.cycle(cli.state_dir)?;
            let result = cycle.run_all(accounts).await;
            print_run(&result);
            if !result.is_success() {
                let total = result.failed.len() + result.succeeded.len();
                bail!("{} of {total} accounts failed", result.failed.len());
            }
            Ok(())
        }
        Commands::Watch { fetch, interval } => {
            if interval == 0 {
                bail!("--interval must be at least 1 second");
            }
            let cycle = fetch.cycle(cli.state_dir)?;
            run_watch(&fetch, &cycle, Duration::from_secs(interval)).await
        }
        Commands::Show {
            account,
            relation,
            json,
        } => run_show(&store, account, relation, json),
        Commands::Ack {
            account,
            relation,
            id,
        } => {
            let mut state = store.load(&account)?;
            let record = state
                .acknowledge_removal(relation, &id)
                .with_context(|| format!("Nothing to acknowledge for {id} in {relation}"))?;
            store.save(&state)?;
            println!("{} {} ({})", "Acknowledged".green(), record.username, record.id);
            Ok(())
        }
        Commands::Forget { account, id } => {
            let mut state = store.load(&account)?;
            let record = state
                .forget_following(&id)
                .with_context(|| format!("{id} is not in the following list"))?;
            store.save(&state)?;
            println!("{} {} ({})", "Forgot".green(), record.username, record.id);
            Ok(())
        }
    }
}

async fn run_watch(fetch: &FetchArgs, cycle: &WatchCycle, interval: Duration) -> Result<()> {
    tracing::info!(interval_secs = interval.as_secs(), "Starting watch loop");

    loop {
        // Re-read every cycle so refreshed credential files are picked up.
        match fetch.accounts() {
            Ok(accounts) => print_run(&cycle.run_all(accounts).await),
            Err(e) => tracing::error!(error = %e, "Skipping cycle"),
        }

        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                tracing::info!("Interrupted, stopping watch loop");
                return Ok(());
            }
        }
    }
}

fn run_show(
    store: &StateStore,
    account: Option<String>,
    relation: Option<Relation>,
    json: bool,
) -> Result<()> {
    let accounts = match account {
        Some(account) => vec![account],
        None => store.accounts()?,
    };
    if accounts.is_empty() {
        println!("No saved state in {}", store.dir().display());
        return Ok(());
    }

    for account_id in accounts {
        let state = store.load(&account_id)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&state)?);
            continue;
        }
        print_state(&state, relation);
    }
    Ok(())
}

fn print_run(result: &RunResult) {
    for outcome in &result.succeeded {
        let summary = &outcome.summary;
        println!(
            "{} {}: {} following (+{} -{}), {} followers (+{} -{})",
            "✓".green(),
            outcome.account_id.bold(),
            summary.following.total,
            summary.following.added.len(),
            summary.following.removed.len(),
            summary.followers.total,
            summary.followers.added.len(),
            summary.followers.removed.len(),
        );
        for (label, report) in [
            ("following", &outcome.following_report),
            ("followers", &outcome.followers_report),
        ] {
            if report.fallback_triggered {
                println!(
                    "  {} {label}: small-page re-check recovered {} records",
                    "!".yellow(),
                    report.fallback_recovered
                );
            }
        }
        if outcome.refreshed_auth.is_some() {
            println!("  {} credentials were refreshed", "!".yellow());
        }
    }
    for (account_id, error) in &result.failed {
        println!("{} {}: {error}", "✗".red(), account_id.bold());
    }
}

fn print_state(state: &AccountState, relation: Option<Relation>) {
    println!("{}", format!("Account {}", state.account_id).bold());
    if let Some(updated_at) = state.updated_at {
        println!("  updated {}", updated_at.format("%Y-%m-%d %H:%M UTC"));
    }

    if relation.is_none() {
        print_records("Not following back", &state.who_i_follow_he_dont_followback);
        print_records("Not followed back", &state.who_i_dont_follow_he_followback);
    }
    if relation.is_none_or(|r| r == Relation::Following) {
        print_records("Unfollowed", state.who_removed_following.entries());
    }
    if relation.is_none_or(|r| r == Relation::Followers) {
        print_records("Stopped following you", state.who_removed_follower.entries());
    }
}

fn print_records(title: &str, records: &[UserRecord]) {
    println!("  {} ({})", title.cyan(), records.len());
    for record in records {
        if record.full_name.is_empty() {
            println!("    {} {}", record.id.dimmed(), record.username);
        } else {
            println!("    {} {} - {}", record.id.dimmed(), record.username, record.full_name);
        }
    }
}
