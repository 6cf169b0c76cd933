use anyhow::{Context, Result};
use neighbor_engage::api::{Engine, EnvironmentGate, RunRequest, SweepRequest};
use neighbor_engage::comments::{CommentWriter, HttpComments, NoComments, TemplateComments};
use neighbor_engage::config::{self, CommentProvider, Config};
use neighbor_engage::engine::{RunController, SessionRegistry};
use neighbor_engage::execution::ActionExecutor;
use neighbor_engage::platform::rest::BridgeRest;
use neighbor_engage::targets::{FileTargetStore, TargetAdmin, TargetAdminRequest};
use neighbor_engage::vault::{CredentialVault, Credentials};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const USAGE: &str = "\
usage: neighbor-engage <command>

  run     [--max-posts N] [--interval S] [--keep-liking] [--dry-run]
  sweep   [--days N] [--neighbors N] [--dry-run]
  targets list | add NICK | remove NICK | init FILE
  encrypt [OUT_FILE]";

/// Value following `flag`, parsed.
fn flag_value<T: std::str::FromStr>(args: &[String], flag: &str) -> Result<Option<T>> {
    match args.iter().position(|a| a == flag) {
        None => Ok(None),
        Some(i) => {
            let raw = args
                .get(i + 1)
                .with_context(|| format!("{} needs a value", flag))?;
            let value = raw
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid value for {}: {}", flag, raw))?;
            Ok(Some(value))
        }
    }
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn build_comments(config: &Config) -> Result<Arc<dyn CommentWriter>> {
    let comments = &config.comments;
    let writer: Arc<dyn CommentWriter> = match comments.provider {
        CommentProvider::None => Arc::new(NoComments),
        CommentProvider::Template => Arc::new(TemplateComments::new(comments.templates.clone())),
        CommentProvider::Http => {
            let endpoint = comments
                .endpoint
                .as_deref()
                .context("comments.endpoint is not set")?;
            Arc::new(HttpComments::new(
                endpoint,
                Duration::from_millis(comments.request_timeout_ms),
            )?)
        }
    };
    Ok(writer)
}

fn build_engine(config: &Config, dry_run: bool) -> Result<Engine> {
    let platform = Arc::new(BridgeRest::new(
        &config.bridge.base_url,
        Duration::from_millis(config.bridge.request_timeout_ms),
    )?);
    let targets = Arc::new(FileTargetStore::new(&config.targets.dir)?);
    let executor = ActionExecutor::new(
        dry_run || config.run.dry_run,
        Duration::from_millis(config.run.action_timeout_ms),
    );
    let controller = RunController::new(
        platform,
        Arc::new(SessionRegistry::new()),
        targets,
        build_comments(config)?,
        executor,
    )
    .with_owner(config.targets.owner_id.clone());

    Ok(Engine::new(controller, EnvironmentGate::from_env())
        .with_run_defaults(config.run.options())
        .with_sweep_defaults(
            config
                .sweep
                .options(Duration::from_secs(config.sweep.hard_limit_s)),
        ))
}

/// Ctrl-C flips the cancel signal; the engine closes the session and
/// returns whatever it has so far.
fn cancel_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping run");
            let _ = tx.send(true);
        }
    });
    rx
}

async fn cmd_run(config: &Config, args: &[String]) -> Result<()> {
    let engine = build_engine(config, has_flag(args, "--dry-run"))?;
    let credentials = Config::credentials()?;
    let request = RunRequest {
        account_id: credentials.account_id.clone(),
        account_secret: credentials.account_secret.clone(),
        max_posts: flag_value(args, "--max-posts")?,
        min_interval_seconds: flag_value(args, "--interval")?,
        keep_liking_after: has_flag(args, "--keep-liking").then_some(true),
    };

    println!();
    println!("  Credentials loaded. Starting run...");
    println!();

    let summary = engine.run(&request, Some(cancel_on_ctrl_c())).await;
    print_json(&summary)
}

async fn cmd_sweep(config: &Config, args: &[String]) -> Result<()> {
    let engine = build_engine(config, has_flag(args, "--dry-run"))?;
    let credentials = Config::credentials()?;
    let request = SweepRequest {
        account_id: credentials.account_id.clone(),
        account_secret: credentials.account_secret.clone(),
        days_limit: flag_value(args, "--days")?,
        max_neighbors: flag_value(args, "--neighbors")?,
    };

    println!();
    println!("  Credentials loaded. Starting sweep...");
    println!();

    let result = engine.sweep(&request, Some(cancel_on_ctrl_c())).await;
    print_json(&result)
}

fn cmd_targets(config: &Config, args: &[String]) -> Result<()> {
    let store = Arc::new(FileTargetStore::new(&config.targets.dir)?);
    let admin = TargetAdmin::new(store, config.targets.owner_id.clone());
    let operand = || args.get(1).cloned().context(USAGE);
    let request = match args.first().map(String::as_str) {
        Some("list") | None => TargetAdminRequest::List,
        Some("add") => TargetAdminRequest::Add { nickname: operand()? },
        Some("remove") => TargetAdminRequest::Remove { nickname: operand()? },
        Some("init") => {
            let path = operand()?;
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read nickname file: {}", path))?;
            TargetAdminRequest::InitFromFile { contents }
        }
        Some(other) => anyhow::bail!("unknown targets action: {}\n{}", other, USAGE),
    };
    print_json(&admin.handle(request))
}

fn cmd_encrypt(args: &[String]) -> Result<()> {
    let vault = CredentialVault::new(Config::master_secret()?);

    println!();
    println!("  Encrypting blog credentials (the passphrase is never stored):");
    println!();

    let credentials = Credentials::new(
        config::prompt("Blog account id")?,
        config::prompt("Blog account password")?,
    );
    let passphrase = config::prompt("Passphrase")?;
    let blob = vault.encrypt(&credentials, &passphrase)?;

    match args.first() {
        Some(out) => {
            std::fs::write(out, blob.to_string())
                .with_context(|| format!("Failed to write credentials file: {}", out))?;
            println!();
            println!("  Wrote {}. Set {}={} to use it.", out, config::ENV_CREDENTIALS_FILE, out);
        }
        None => println!("{}", blob),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_file = std::fs::File::create("neighbor-engage.log")?;
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("neighbor_engage=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(log_file)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().cloned() else {
        println!("{}", USAGE);
        return Ok(());
    };
    let rest = &args[1..];

    let config = Config::load(Path::new("config.toml"))?;

    // Load saved keys from .env (real env vars take precedence)
    Config::load_env_file();

    println!();
    println!("  Neighbor Engage v0.1.0");
    println!("  ======================");

    match command.as_str() {
        "run" => cmd_run(&config, rest).await,
        "sweep" => cmd_sweep(&config, rest).await,
        "targets" => cmd_targets(&config, rest),
        "encrypt" => cmd_encrypt(rest),
        other => anyhow::bail!("unknown command: {}\n{}", other, USAGE),
    }
}
