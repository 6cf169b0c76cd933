use crate::engine::{RunOptions, SweepOptions};
use crate::vault::{CredentialVault, Credentials};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_FILE: &str = ".env";

pub const ENV_ACCOUNT_ID: &str = "ENGAGE_ACCOUNT_ID";
pub const ENV_ACCOUNT_SECRET: &str = "ENGAGE_ACCOUNT_SECRET";
pub const ENV_MASTER_SECRET: &str = "ENGAGE_MASTER_SECRET";
pub const ENV_CREDENTIALS_FILE: &str = "ENGAGE_CREDENTIALS_FILE";
pub const ENV_PASSPHRASE: &str = "ENGAGE_PASSPHRASE";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub targets: TargetsConfig,
    #[serde(default)]
    pub comments: CommentsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BridgeConfig {
    pub base_url: String,
    #[serde(default = "default_bridge_timeout")]
    pub request_timeout_ms: u64,
}

fn default_bridge_timeout() -> u64 { 30_000 }

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RunConfig {
    pub max_posts: u32,
    pub min_interval_s: u64,
    pub keep_liking_after: bool,
    pub days_limit: u32,
    pub global_timeout_s: u64,
    pub keep_liking_cap: u32,
    pub action_timeout_ms: u64,
    pub dry_run: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_posts: 5,
            min_interval_s: 3,
            keep_liking_after: false,
            days_limit: 7,
            global_timeout_s: 300,
            keep_liking_cap: 30,
            action_timeout_ms: 20_000,
            dry_run: false,
        }
    }
}

impl RunConfig {
    pub fn options(&self) -> RunOptions {
        RunOptions {
            days_limit: self.days_limit,
            max_posts: self.max_posts as usize,
            min_interval: Duration::from_secs(self.min_interval_s),
            keep_liking_after: self.keep_liking_after,
            keep_liking_cap: self.keep_liking_cap as usize,
            global_timeout: Duration::from_secs(self.global_timeout_s),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SweepConfig {
    pub days_limit: u32,
    pub max_neighbors: u32,
    pub hard_limit_s: u64,
    pub min_interval_s: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            days_limit: 7,
            max_neighbors: 10,
            hard_limit_s: 600,
            min_interval_s: 3,
        }
    }
}

impl SweepConfig {
    /// `global_timeout` is the caller's budget; `hard_limit_s` still caps it.
    pub fn options(&self, global_timeout: Duration) -> SweepOptions {
        SweepOptions {
            days_limit: self.days_limit,
            max_neighbors: self.max_neighbors as usize,
            min_interval: Duration::from_secs(self.min_interval_s),
            global_timeout,
            hard_limit: Duration::from_secs(self.hard_limit_s),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TargetsConfig {
    pub dir: PathBuf,
    pub owner_id: String,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/targets"),
            owner_id: crate::targets::DEFAULT_OWNER.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommentProvider {
    None,
    Template,
    Http,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CommentsConfig {
    pub provider: CommentProvider,
    pub templates: Vec<String>,
    pub endpoint: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for CommentsConfig {
    fn default() -> Self {
        Self {
            provider: CommentProvider::None,
            templates: Vec::new(),
            endpoint: None,
            request_timeout_ms: 15_000,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .with_context(|| "Failed to parse config TOML")?;
        if config.comments.provider == CommentProvider::Http && config.comments.endpoint.is_none() {
            anyhow::bail!("comments.provider = \"http\" requires comments.endpoint");
        }
        Ok(config)
    }

    /// Load .env file into process environment. Real env vars take precedence.
    pub fn load_env_file() {
        let path = Path::new(ENV_FILE);
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return,
        };
        // Strip BOM if present (common on Windows-created files)
        let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
        for line in content.lines() {
            let line = line.trim().trim_matches('\r');
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim().trim_matches('"').trim_matches('\'');
                if std::env::var(key).is_err() {
                    std::env::set_var(key, value);
                }
            }
        }
    }

    /// Blog account credentials for this run.
    ///
    /// With `ENGAGE_CREDENTIALS_FILE` set, the file holds an encrypted blob
    /// that is opened with the master secret and a passphrase. Otherwise the
    /// pair comes from env vars or an interactive prompt. The account secret
    /// and passphrase are never written to .env.
    pub fn credentials() -> Result<Credentials> {
        if let Some(path) = env_value(ENV_CREDENTIALS_FILE) {
            let wire = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read credentials file: {}", path))?;
            let vault = CredentialVault::new(Self::master_secret()?);
            let passphrase = match env_value(ENV_PASSPHRASE) {
                Some(p) => p,
                None => prompt("Credentials passphrase")?,
            };
            return vault
                .decrypt_wire(&wire, &passphrase)
                .context("Failed to open credentials file");
        }

        let account_id = match env_value(ENV_ACCOUNT_ID) {
            Some(id) => id,
            None => {
                let id = prompt("Blog account id")?;
                save_env_var(ENV_ACCOUNT_ID, &id);
                id
            }
        };
        let account_secret = match env_value(ENV_ACCOUNT_SECRET) {
            Some(secret) => secret,
            None => prompt("Blog account password")?,
        };
        Ok(Credentials::new(account_id, account_secret))
    }

    /// Application-wide secret mixed into every vault key.
    pub fn master_secret() -> Result<String> {
        env_value(ENV_MASTER_SECRET)
            .with_context(|| format!("{} must be set to use the credential vault", ENV_MASTER_SECRET))
    }
}

fn env_value(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(sanitize_key(&v)),
        _ => None,
    }
}

pub fn prompt(label: &str) -> Result<String> {
    print!("  {} > ", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let value = input.trim().to_string();
    if value.is_empty() {
        anyhow::bail!("{} cannot be empty", label);
    }
    Ok(value)
}

/// Strip carriage returns, BOM, and other invisible chars from a key/path value.
fn sanitize_key(raw: &str) -> String {
    raw.replace(['\r', '\u{feff}', '\u{200b}'], "")
        .trim()
        .to_string()
}

/// Append a KEY=VALUE line to .env and set it in the current process.
fn save_env_var(key: &str, value: &str) {
    std::env::set_var(key, value);
    let path = Path::new(ENV_FILE);
    let mut contents = std::fs::read_to_string(path).unwrap_or_default();
    if !contents.is_empty() && !contents.ends_with('\n') {
        contents.push('\n');
    }
    contents.push_str(&format!("{}={}\n", key, value));
    let _ = std::fs::write(path, contents);
}
