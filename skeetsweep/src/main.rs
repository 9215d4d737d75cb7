//! skeetsweep - Delete old Bluesky posts and reposts

mod progress;

use anyhow::{Context, Result};
use chrono::{Days, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use libskeetsweep::config::DeleteMode;
use libskeetsweep::credentials::{resolve_app_password, KeyringStore};
use libskeetsweep::deletion::DeletionReport;
use libskeetsweep::logging::{LogFormat, LoggingConfig};
use libskeetsweep::platforms::bluesky::BlueskyClient;
use libskeetsweep::retention::{PostAnalysis, RepostAnalysis};
use libskeetsweep::service::{SweepOutcome, SweepService, SweepSettings};
use libskeetsweep::{Config, PlatformError, RetentionPolicy, SweepError};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use crate::progress::{ProgressDisplay, Stage};

#[derive(Parser, Debug)]
#[command(name = "skeetsweep")]
#[command(version, about = "Delete old Bluesky posts and reposts that no retention rule protects")]
#[command(long_about = r#"Delete old Bluesky posts and reposts that no retention rule protects.

Every rule you enable is an independent reason to keep a post. A post is only
deleted when none of the enabled rules protects it; with no rules at all,
every post is deleted.

EXAMPLES:
    # Preview which posts would go
    skeetsweep --handle alice.bsky.social posts --min-likes 10 --protect-threads --dry-run

    # Keep anything from the last 90 days, anything liked by you, and threads
    skeetsweep posts --older-than 90days --protect-self-liked --protect-threads

    # Undo every repost made before 2024
    skeetsweep reposts --before 2024-01-01 --yes

    # Store the app password in the OS keyring
    skeetsweep --handle alice.bsky.social login

CREDENTIALS:
    The app password is read from --password-stdin, SKEETSWEEP_APP_PASSWORD,
    the OS keyring, or an interactive prompt, in that order.

EXIT CODES:
    0 - Success (including nothing to delete)
    1 - Error (fetch failed, some deletions failed, bad config)
    2 - Authentication error
    3 - Invalid input
"#)]
struct Cli {
    /// Configuration file (default: ~/.config/skeetsweep/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Account handle or DID (overrides config)
    #[arg(long, global = true, value_name = "HANDLE")]
    handle: Option<String>,

    /// Read the app password from the first line of stdin
    #[arg(long, global = true)]
    password_stdin: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format: text, json, or pretty
    #[arg(long, global = true, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Delete posts that no retention rule protects
    Posts(PostsArgs),

    /// Delete reposts created before a cutoff date
    Reposts(RepostsArgs),

    /// Check the app password and store it in the OS keyring
    Login,

    /// Remove the stored app password from the OS keyring
    Logout,
}

#[derive(Args, Debug)]
struct PostsArgs {
    /// Keep posts with at least this many likes
    #[arg(long, value_name = "N")]
    min_likes: Option<u64>,

    /// Keep posts with at least this many reposts
    #[arg(long, value_name = "N")]
    min_reposts: Option<u64>,

    /// Keep posts that are part of a reply thread
    #[arg(long)]
    protect_threads: bool,

    /// Keep posts you have liked yourself
    #[arg(long)]
    protect_self_liked: bool,

    #[command(flatten)]
    cutoff: CutoffArgs,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args, Debug)]
struct RepostsArgs {
    #[command(flatten)]
    cutoff: CutoffArgs,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args, Debug)]
struct CutoffArgs {
    /// Only items created before this day lose date protection
    #[arg(long, value_name = "YYYY-MM-DD", conflicts_with = "older_than")]
    before: Option<String>,

    /// Like --before, relative to today (e.g. "30days", "1year")
    #[arg(long, value_name = "DURATION")]
    older_than: Option<String>,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Delete one record per call (single) or up to 200 per call (batch)
    #[arg(long, value_name = "MODE")]
    mode: Option<DeleteMode>,

    /// Show what would be deleted without deleting anything
    #[arg(long)]
    dry_run: bool,

    /// Do not ask for confirmation
    #[arg(short, long)]
    yes: bool,

    /// Output format
    #[arg(short, long, default_value = "text", value_name = "FORMAT")]
    #[arg(value_parser = ["text", "json"])]
    format: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(&cli);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}

fn init_logging(cli: &Cli) {
    let mut logging = LoggingConfig::from_env();
    // Progress bars share stderr with the log, so stay quiet unless asked
    if std::env::var("SKEETSWEEP_LOG_LEVEL").is_err() {
        logging.level = "warn".to_string();
    }
    if let Some(format) = cli.log_format {
        logging.format = format;
    }
    logging.verbose = cli.verbose;
    logging.init();
}

fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<SweepError>()
        .map(SweepError::exit_code)
        .unwrap_or(1)
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    if let Some(handle) = cli.handle {
        config.account.handle = Some(handle);
    }
    let today = Utc::now().date_naive();

    match cli.command {
        Command::Posts(args) => {
            let policy = posts_policy(&config, &args, today)?;
            let mut settings = SweepSettings::from_config(&config);
            if let Some(mode) = args.run.mode {
                settings.post_mode = mode;
            }
            let service = connect(&config, cli.password_stdin, settings).await?;
            run_posts(&service, &policy, &args.run).await
        }
        Command::Reposts(args) => {
            let cutoff = repost_cutoff(&config, &args.cutoff, today)?;
            let mut settings = SweepSettings::from_config(&config);
            if let Some(mode) = args.run.mode {
                settings.repost_mode = mode;
            }
            let service = connect(&config, cli.password_stdin, settings).await?;
            run_reposts(&service, cutoff, &args.run).await
        }
        Command::Login => {
            let handle = config.handle()?;
            let password = resolve_app_password(handle, cli.password_stdin)?;
            let mut client = BlueskyClient::new(&config.service.pds_url)?;
            let session = client.login(handle, &password).await?;
            println!("Authenticated as {} ({})", session.handle, session.did);
            KeyringStore::store(handle, &password)?;
            println!("App password stored in the OS keyring");
            Ok(())
        }
        Command::Logout => {
            let handle = config.handle()?;
            KeyringStore::delete(handle)?;
            println!("Removed stored app password for {}", handle);
            Ok(())
        }
    }
}

/// Parse `--before` / `--older-than` into a cutoff day
fn parse_cutoff(args: &CutoffArgs, today: NaiveDate) -> Result<Option<NaiveDate>, SweepError> {
    if let Some(before) = &args.before {
        let day = NaiveDate::parse_from_str(before, "%Y-%m-%d").map_err(|e| {
            SweepError::InvalidInput(format!(
                "Invalid --before date '{}': {}. Expected YYYY-MM-DD",
                before, e
            ))
        })?;
        return Ok(Some(day));
    }

    if let Some(older_than) = &args.older_than {
        let duration = humantime::parse_duration(older_than).map_err(|e| {
            SweepError::InvalidInput(format!("Invalid --older-than '{}': {}", older_than, e))
        })?;
        let days = duration.as_secs() / 86_400;
        let day = today.checked_sub_days(Days::new(days)).ok_or_else(|| {
            SweepError::InvalidInput(format!("--older-than '{}' is out of range", older_than))
        })?;
        return Ok(Some(day));
    }

    Ok(None)
}

/// Policy from the config file with command-line rules layered on top
fn posts_policy(
    config: &Config,
    args: &PostsArgs,
    today: NaiveDate,
) -> Result<RetentionPolicy, SweepError> {
    let mut policy = config.retention_policy(today);
    if args.min_likes.is_some() {
        policy.min_likes = args.min_likes;
    }
    if args.min_reposts.is_some() {
        policy.min_reposts = args.min_reposts;
    }
    policy.protect_threads |= args.protect_threads;
    policy.protect_self_liked |= args.protect_self_liked;
    if let Some(cutoff) = parse_cutoff(&args.cutoff, today)? {
        policy.date_cutoff = Some(cutoff);
    }
    Ok(policy)
}

fn repost_cutoff(
    config: &Config,
    args: &CutoffArgs,
    today: NaiveDate,
) -> Result<NaiveDate, SweepError> {
    if let Some(cutoff) = parse_cutoff(args, today)? {
        return Ok(cutoff);
    }
    config.retention_policy(today).date_cutoff.ok_or_else(|| {
        SweepError::InvalidInput(
            "reposts needs a cutoff: pass --before or --older-than, or set retention.delete_before"
                .to_string(),
        )
    })
}

async fn connect(
    config: &Config,
    password_stdin: bool,
    settings: SweepSettings,
) -> Result<SweepService> {
    let handle = config.handle()?;
    let password = resolve_app_password(handle, password_stdin)?;

    let mut client = BlueskyClient::new(&config.service.pds_url)?;
    client.login(handle, &password).await?;

    Ok(SweepService::new(Arc::new(client), settings))
}

async fn run_posts(service: &SweepService, policy: &RetentionPolicy, run: &RunArgs) -> Result<()> {
    if !policy.has_rules() {
        tracing::warn!("No retention rules enabled: every post will be selected");
    }

    let show = run.format == "text";
    let display = ProgressDisplay::spawn(service.subscribe(), Stage::Analysis, show);
    let analysis = match service.analyze_posts(policy).await {
        Ok(analysis) => {
            display.wait().await;
            analysis
        }
        Err(e) => {
            display.cancel();
            return Err(e.into());
        }
    };

    if show {
        print_post_analysis(&analysis);
    }

    let report = delete_confirmed(
        service,
        "posts",
        analysis.to_delete.len(),
        run,
        service.delete_posts(&analysis),
    )
    .await?;

    finish(SweepOutcome { analysis, report }, run)
}

async fn run_reposts(service: &SweepService, cutoff: NaiveDate, run: &RunArgs) -> Result<()> {
    let show = run.format == "text";
    let display = ProgressDisplay::spawn(service.subscribe(), Stage::Analysis, show);
    let analysis = match service.analyze_reposts(cutoff).await {
        Ok(analysis) => {
            display.wait().await;
            analysis
        }
        Err(e) => {
            display.cancel();
            return Err(e.into());
        }
    };

    if show {
        print_repost_analysis(&analysis, cutoff);
    }

    let report = delete_confirmed(
        service,
        "reposts",
        analysis.to_delete.len(),
        run,
        service.delete_reposts(&analysis),
    )
    .await?;

    finish(SweepOutcome { analysis, report }, run)
}

/// Ask, then run `deletion` with a progress bar
///
/// Returns `None` when nothing was deleted: dry run, empty selection, or the
/// user declined.
async fn delete_confirmed(
    service: &SweepService,
    noun: &str,
    count: usize,
    run: &RunArgs,
    deletion: impl std::future::Future<Output = DeletionReport>,
) -> Result<Option<DeletionReport>> {
    let show = run.format == "text";

    if count == 0 {
        if show {
            println!("Nothing to delete.");
        }
        return Ok(None);
    }
    if run.dry_run {
        if show {
            println!("Dry run: no {} were deleted.", noun);
        }
        return Ok(None);
    }
    if !confirm(&format!("Delete {} {}?", count, noun), run.yes)? {
        println!("Aborted.");
        return Ok(None);
    }

    let display = ProgressDisplay::spawn(service.subscribe(), Stage::Deletion, show);
    let report = deletion.await;
    display.wait().await;
    Ok(Some(report))
}

fn confirm(prompt: &str, assume_yes: bool) -> Result<bool, SweepError> {
    if assume_yes {
        return Ok(true);
    }
    if !atty::is(atty::Stream::Stdin) {
        return Err(SweepError::InvalidInput(
            "Refusing to delete without confirmation. Pass --yes to run non-interactively".to_string(),
        ));
    }

    eprint!("{} [y/N] ", prompt);
    let _ = io::stderr().flush();

    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .map_err(|e| SweepError::InvalidInput(format!("Failed to read answer: {}", e)))?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn print_post_analysis(analysis: &PostAnalysis) {
    println!(
        "Posts: {} fetched, {} kept, {} to delete",
        analysis.total,
        analysis.kept(),
        analysis.to_delete.len()
    );
    for (reason, count) in &analysis.kept_by {
        println!("  kept ({}): {}", reason, count);
    }
}

fn print_repost_analysis(analysis: &RepostAnalysis, cutoff: NaiveDate) {
    println!(
        "Reposts: {} fetched, {} created before {}",
        analysis.total,
        analysis.to_delete.len(),
        cutoff
    );
    if analysis.undated > 0 {
        println!("  kept (unreadable date): {}", analysis.undated);
    }
}

/// Print the result and turn failed deletions into a non-zero exit
fn finish<A: serde::Serialize>(outcome: SweepOutcome<A>, run: &RunArgs) -> Result<()> {
    if run.format == "json" {
        let json = serde_json::to_string_pretty(&outcome).context("Failed to serialize result")?;
        println!("{}", json);
    } else if let Some(report) = &outcome.report {
        println!(
            "Deleted {} of {} ({} failed)",
            report.succeeded, report.attempted, report.failed
        );
        for failure in &report.failures {
            println!("  {}: {}", failure.uri, failure.error);
        }
    }

    match &outcome.report {
        Some(report) if report.failed > 0 => Err(SweepError::Platform(PlatformError::Delete(
            format!("{} of {} deletions failed", report.failed, report.attempted),
        ))
        .into()),
        _ => Ok(()),
    }
}
