//! Gatehouse CLI - quality gate and promotion ladder
//!
//! The `gatehouse` command runs the configured check pipeline against a
//! workspace and drives promotions up the environment ladder.
//!
//! ## Commands
//!
//! - `run`: Execute the check pipeline and persist the run
//! - `promote`: Evaluate and apply a promotion backed by a persisted run
//! - `releases`: Show the production release log
//! - `history`: Show persisted pipeline runs
//! - `ladder`: Show environments, their branches, and promotion policies
//! - `validate`: Check a configuration file without running anything

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Instrument, Level};

use gatehouse_ci::{CancelToken, GateConfig, GatePipeline, ResolvedConfig};
use gatehouse_core::{
    obs, Environment, LogSink, Notifier, PipelineRun, PromotionDecision, PromotionOutcome,
    PromotionRequest, PromotionStateMachine, ReleaseTagger, RunStatus, TriggerRef, Version,
    VersionBump, WebhookSink,
};
use gatehouse_state::{
    ReleaseLog, RunHistory, SurrealHandle, SurrealReleaseLog, SurrealRunHistory, TimeRange,
};

/// How long to wait for webhook deliveries before the process exits.
const NOTIFY_FLUSH_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Parser)]
#[command(name = "gatehouse")]
#[command(author = "Gatehouse Maintainers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Quality gate pipeline and environment promotion engine", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines and JSON command output
    #[arg(long, global = true)]
    json: bool,

    /// Gate configuration file (default: <workspace>/gatehouse.toml, else builtin)
    #[arg(long, global = true, env = "GATEHOUSE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory of the embedded store (default: .gatehouse/db)
    #[arg(long, global = true, env = "GATEHOUSE_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the check pipeline against a workspace
    Run {
        /// Workspace root the checks run in
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,

        /// Branch the run is recorded against (auto-detected from git if omitted)
        #[arg(long)]
        branch: Option<String>,

        /// Commit the run validates (auto-detected from git if omitted)
        #[arg(long)]
        commit: Option<String>,
    },

    /// Promote a branch one environment up the ladder
    Promote {
        /// Branch being promoted
        #[arg(long)]
        branch: String,

        /// Environment the branch is currently in
        #[arg(long)]
        from: Environment,

        /// Target environment (must be the next rung)
        #[arg(long)]
        to: Environment,

        /// Persisted pipeline run backing the promotion
        #[arg(long = "run")]
        run_id: String,

        /// Number of approvals the change has
        #[arg(long, default_value = "0")]
        approvals: u32,

        /// Version component to bump on a production release
        #[arg(long, default_value = "patch")]
        bump: VersionBump,

        /// Commit to promote (default: the run's commit)
        #[arg(long)]
        commit: Option<String>,

        /// Re-promote the commit of an earlier release into production
        #[arg(long, conflicts_with = "commit")]
        rollback_of: Option<Version>,
    },

    /// Show the production release log
    Releases {
        #[command(flatten)]
        filter: HistoryFilter,
    },

    /// Show persisted pipeline runs
    History {
        #[command(flatten)]
        filter: HistoryFilter,
    },

    /// Show environments, their branches, and promotion policies
    Ladder,

    /// Validate the gate configuration
    Validate,
}

#[derive(clap::Args)]
struct HistoryFilter {
    /// Only records for this commit
    #[arg(long)]
    commit: Option<String>,

    /// Earliest timestamp (RFC 3339 or YYYY-MM-DD)
    #[arg(long, value_parser = parse_time)]
    since: Option<DateTime<Utc>>,

    /// Latest timestamp (RFC 3339 or YYYY-MM-DD)
    #[arg(long, value_parser = parse_time)]
    until: Option<DateTime<Utc>>,
}

impl HistoryFilter {
    fn range(&self) -> TimeRange {
        TimeRange::new(self.since, self.until)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    gatehouse_core::init_tracing(cli.json, level);

    match &cli.command {
        Commands::Run {
            workspace,
            branch,
            commit,
        } => {
            let config = load_config(cli.config.as_deref(), workspace)?;
            let handle = open_store(cli.db.as_deref()).await?;
            let status = cmd_run(
                &handle,
                &config,
                workspace,
                branch.clone(),
                commit.clone(),
                cli.json,
            )
            .await?;
            if status == RunStatus::Failed || status == RunStatus::Cancelled {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Promote {
            branch,
            from,
            to,
            run_id,
            approvals,
            bump,
            commit,
            rollback_of,
        } => {
            let config = load_config(cli.config.as_deref(), Path::new("."))?;
            let handle = open_store(cli.db.as_deref()).await?;
            let args = PromoteArgs {
                branch,
                from: *from,
                to: *to,
                run_id,
                approvals: *approvals,
                bump: *bump,
                commit: commit.as_deref(),
                rollback_of: *rollback_of,
            };
            let outcome = cmd_promote(&handle, &config, args, cli.json).await?;
            if !outcome.decision.is_allowed() {
                std::process::exit(2);
            }
            Ok(())
        }
        Commands::Releases { filter } => {
            let handle = open_store(cli.db.as_deref()).await?;
            cmd_releases(&handle, filter, cli.json).await
        }
        Commands::History { filter } => {
            let handle = open_store(cli.db.as_deref()).await?;
            cmd_history(&handle, filter, cli.json).await
        }
        Commands::Ladder => {
            let config = load_config(cli.config.as_deref(), Path::new("."))?;
            cmd_ladder(&config, cli.json)
        }
        Commands::Validate => {
            let config = load_config(cli.config.as_deref(), Path::new("."))?;
            cmd_validate(&config, cli.json)
        }
    }
}

/// Resolve the configuration: explicit path, then `<workspace>/gatehouse.toml`,
/// then the builtin gate.
fn load_config(explicit: Option<&Path>, workspace: &Path) -> Result<ResolvedConfig> {
    let local = workspace.join("gatehouse.toml");
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None if local.is_file() => Some(local),
        None => None,
    };

    match &path {
        Some(p) => info!(path = %p.display(), "loading gate configuration"),
        None => info!("no gatehouse.toml found, using builtin gate"),
    }

    let config = GateConfig::load_or_builtin(path.as_deref())?;
    Ok(config.resolve()?)
}

async fn open_store(db: Option<&Path>) -> Result<SurrealHandle> {
    let handle = match db {
        Some(dir) => SurrealHandle::open(dir).await,
        None => SurrealHandle::from_env(Path::new(".gatehouse/db")).await,
    };
    handle.context("Failed to open Gatehouse store")
}

fn notifier_for(config: &ResolvedConfig) -> Result<Notifier> {
    Ok(match &config.webhook_url {
        Some(url) => Notifier::new(Arc::new(WebhookSink::new(url.clone())?)),
        None => Notifier::new(Arc::new(LogSink)),
    })
}

/// Run the pipeline, print the report, and return the overall status.
async fn cmd_run(
    handle: &SurrealHandle,
    config: &ResolvedConfig,
    workspace: &Path,
    branch: Option<String>,
    commit: Option<String>,
    json: bool,
) -> Result<RunStatus> {
    let branch = branch
        .or_else(|| git_output(workspace, &["rev-parse", "--abbrev-ref", "HEAD"]))
        .unwrap_or_else(|| "unknown".to_string());
    let commit = commit
        .or_else(|| git_output(workspace, &["rev-parse", "HEAD"]))
        .unwrap_or_else(|| "unknown".to_string());

    let notifier = notifier_for(config)?;
    let history: Arc<dyn RunHistory> = Arc::new(SurrealRunHistory::new(handle.clone()));
    let pipeline = GatePipeline::new(config.pipeline.clone())?
        .with_history(history)
        .with_notifier(notifier.clone());

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling remaining checks");
            on_interrupt.cancel();
        }
    });

    if !json {
        println!("Running {} checks in {}", config.specs.len(), workspace.display());
        println!("Branch: {}  Commit: {}", branch, commit);
        println!();
    }

    let ws = config.project.workspace(workspace);
    let run = pipeline
        .execute_with_cancel(&config.specs, &ws, TriggerRef::new(branch, commit), cancel)
        .await
        .context("Pipeline failed to run")?;
    notifier.flush(NOTIFY_FLUSH_TIMEOUT).await;

    let _span = obs::RunSpan::enter(&run.id.to_string());
    let status = run.overall_status();
    info!(status = %status.as_str(), "run complete");
    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        print!("{}", run.report());
    }

    Ok(status)
}

struct PromoteArgs<'a> {
    branch: &'a str,
    from: Environment,
    to: Environment,
    run_id: &'a str,
    approvals: u32,
    bump: VersionBump,
    commit: Option<&'a str>,
    rollback_of: Option<Version>,
}

async fn cmd_promote(
    handle: &SurrealHandle,
    config: &ResolvedConfig,
    args: PromoteArgs<'_>,
    json: bool,
) -> Result<PromotionOutcome> {
    let history = SurrealRunHistory::new(handle.clone());
    let record = history
        .get(args.run_id)
        .await
        .with_context(|| format!("Run not found: {}", args.run_id))?;
    let run = PipelineRun::from_record(&record)?;

    let log: Arc<dyn ReleaseLog> = Arc::new(SurrealReleaseLog::new(handle.clone()));
    let tagger = Arc::new(ReleaseTagger::new(log));
    let notifier = notifier_for(config)?;
    let machine = PromotionStateMachine::new(config.policies.clone(), tagger)
        .with_notifier(notifier.clone());

    // Positions live in memory; the caller vouches for where the branch is.
    machine.ladder().ensure_branch(args.branch, args.from).await;

    let request = match args.rollback_of {
        Some(version) => {
            if args.from != Environment::Uat || args.to != Environment::Production {
                anyhow::bail!("--rollback-of only applies to uat -> production");
            }
            machine
                .rollback_request(args.branch, version, run, args.approvals)
                .await?
        }
        None => {
            let req = PromotionRequest::new(args.branch, args.from, args.to, run, args.approvals)
                .with_bump(args.bump);
            match args.commit {
                Some(c) => req.with_commit(c),
                None => req,
            }
        }
    };

    let outcome = machine
        .submit(request)
        .instrument(obs::run_span(args.run_id))
        .await?;
    notifier.flush(NOTIFY_FLUSH_TIMEOUT).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        match &outcome.decision {
            PromotionDecision::Allowed => {
                println!("ALLOWED {} {} -> {}", args.branch, args.from, args.to);
            }
            PromotionDecision::Blocked(reason) => {
                println!("BLOCKED {} {} -> {}", args.branch, args.from, args.to);
                println!("Reason: {} ({})", reason, reason.code());
            }
        }
        println!("Position: {}", outcome.position);
        if let Some(release) = &outcome.release {
            println!(
                "Release: {} (commit {}, #{})",
                release.version, release.commit_ref, release.seq
            );
        }
    }

    Ok(outcome)
}

async fn cmd_releases(handle: &SurrealHandle, filter: &HistoryFilter, json: bool) -> Result<()> {
    let log = SurrealReleaseLog::new(handle.clone());
    let mut records = match &filter.commit {
        Some(c) => log.by_commit(c).await?,
        None => log.between(filter.range()).await?,
    };
    let range = filter.range();
    records.retain(|r| range.contains(r.created_at));

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No releases found.");
        return Ok(());
    }

    println!("{:<5} {:<10} {:<12} {:<20} CREATED", "SEQ", "VERSION", "COMMIT", "BRANCH");
    for r in &records {
        let rollback = r
            .rollback_of
            .as_deref()
            .map(|v| format!(" (rollback of {})", v))
            .unwrap_or_default();
        println!(
            "{:<5} {:<10} {:<12} {:<20} {}{}",
            r.seq,
            r.version,
            short(&r.commit_ref),
            r.branch,
            r.created_at.to_rfc3339(),
            rollback
        );
    }
    Ok(())
}

async fn cmd_history(handle: &SurrealHandle, filter: &HistoryFilter, json: bool) -> Result<()> {
    let history = SurrealRunHistory::new(handle.clone());
    let mut records = match &filter.commit {
        Some(c) => history.by_commit(c).await?,
        None => history.between(filter.range()).await?,
    };
    let range = filter.range();
    records.retain(|r| range.contains(r.finished_at));

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No runs found.");
        return Ok(());
    }

    for r in &records {
        println!(
            "{}  {:<9} {:<20} {}  {}",
            r.run_id,
            r.status,
            r.branch,
            short(&r.commit_ref),
            r.finished_at.to_rfc3339()
        );
    }
    Ok(())
}

fn cmd_ladder(config: &ResolvedConfig, json: bool) -> Result<()> {
    if json {
        let rungs: Vec<_> = Environment::LADDER
            .iter()
            .map(|env| {
                serde_json::json!({
                    "environment": env,
                    "branch": env.branch_name(),
                    "next": env.successor(),
                    "policy": config.policies.policy(*env),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rungs)?);
        return Ok(());
    }

    for env in Environment::LADDER {
        let policy = config.policies.policy(env);
        let next = env
            .successor()
            .map(|n| format!(" -> {}", n))
            .unwrap_or_default();
        println!("{} [{}]{}", env, env.branch_name(), next);
        println!("  approvals: {}", policy.required_approvals);
        if !policy.required_checks.is_empty() {
            println!("  checks:    {}", policy.required_checks.join(", "));
        }
        if policy.allow_direct_push {
            println!("  direct push allowed");
        }
    }
    Ok(())
}

fn cmd_validate(config: &ResolvedConfig, json: bool) -> Result<()> {
    let levels = gatehouse_ci::plan_levels(&config.specs)?;

    if json {
        let plan: Vec<Vec<&str>> = levels
            .iter()
            .map(|level| level.iter().map(|&i| config.specs[i].name.as_str()).collect())
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "valid": true,
                "checks": config.specs.len(),
                "spec_digest": gatehouse_ci::spec_digest(&config.specs),
                "levels": plan,
            }))?
        );
        return Ok(());
    }

    println!("Configuration OK: {} checks", config.specs.len());
    for (i, level) in levels.iter().enumerate() {
        let names: Vec<String> = level
            .iter()
            .map(|&idx| {
                let spec = &config.specs[idx];
                if spec.blocking {
                    spec.name.clone()
                } else {
                    format!("{} (advisory)", spec.name)
                }
            })
            .collect();
        println!("  level {}: {}", i, names.join(", "));
    }
    Ok(())
}

/// Run git in `dir` and return trimmed stdout, if git succeeded.
fn git_output(dir: &Path, args: &[&str]) -> Option<String> {
    let output = std::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let out = String::from_utf8(output.stdout).ok()?.trim().to_string();
    (!out.is_empty()).then_some(out)
}

fn short(commit: &str) -> &str {
    commit.get(..10).unwrap_or(commit)
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
        .ok_or_else(|| format!("expected RFC 3339 timestamp or YYYY-MM-DD, got '{}'", raw))
}
