//! Target allow-list: the nicknames the engine may engage with.
//!
//! Stores only implement `load`/`save`; the add/remove/replace semantics live
//! in the trait's provided methods so every backend behaves the same. There is
//! no locking between load and save: concurrent writers are last-writer-wins.

pub mod admin;
pub mod file;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

pub use admin::{TargetAdmin, TargetAdminRequest, TargetAdminResponse};
pub use file::FileTargetStore;

/// Owner id used when the caller does not supply one.
pub const DEFAULT_OWNER: &str = "default";

#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("no target list for owner {0}")]
    NotFound(String),

    #[error("nickname already present: {0}")]
    AlreadyPresent(String),

    #[error("nickname not present: {0}")]
    NotPresent(String),

    #[error("invalid nickname: {0:?}")]
    InvalidNickname(String),

    #[error("invalid owner id: {0:?}")]
    InvalidOwner(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(String),
}

impl TargetError {
    /// Idempotence no-ops (duplicate add, absent remove) are soft failures.
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::AlreadyPresent(_) | Self::NotPresent(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetList {
    pub owner_id: String,
    pub nicknames: BTreeSet<String>,
    pub updated_at: DateTime<Utc>,
}

impl TargetList {
    pub fn new(owner_id: &str, nicknames: BTreeSet<String>) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            nicknames,
            updated_at: Utc::now(),
        }
    }

    pub fn contains(&self, nickname: &str) -> bool {
        self.nicknames.contains(nickname.trim())
    }

    pub fn len(&self) -> usize {
        self.nicknames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nicknames.is_empty()
    }
}

/// Trim a nickname and reject values that cannot be matched against a feed.
pub fn normalize_nickname(raw: &str) -> Result<String, TargetError> {
    let nickname = raw.trim();
    if nickname.is_empty() || nickname.contains(['\n', '\r']) {
        return Err(TargetError::InvalidNickname(raw.to_string()));
    }
    Ok(nickname.to_string())
}

/// Parse a newline-delimited nickname list. Blank lines and `#` comments are
/// ignored; duplicates collapse.
pub fn parse_nickname_list(contents: &str) -> BTreeSet<String> {
    let contents = contents.strip_prefix('\u{feff}').unwrap_or(contents);
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub trait TargetStore: Send + Sync {
    fn load(&self, owner_id: &str) -> Result<Option<TargetList>, TargetError>;

    fn save(&self, list: &TargetList) -> Result<(), TargetError>;

    fn get(&self, owner_id: &str) -> Result<TargetList, TargetError> {
        self.load(owner_id)?
            .ok_or_else(|| TargetError::NotFound(owner_id.to_string()))
    }

    /// Upsert: create the list or overwrite its whole nickname set.
    fn replace(
        &self,
        owner_id: &str,
        nicknames: BTreeSet<String>,
    ) -> Result<TargetList, TargetError> {
        let nicknames = nicknames
            .iter()
            .map(|n| normalize_nickname(n))
            .collect::<Result<BTreeSet<_>, _>>()?;
        let list = TargetList::new(owner_id, nicknames);
        self.save(&list)?;
        tracing::info!(owner = owner_id, count = list.len(), "target list replaced");
        Ok(list)
    }

    fn add(&self, owner_id: &str, nickname: &str) -> Result<TargetList, TargetError> {
        let nickname = normalize_nickname(nickname)?;
        let mut list = self
            .load(owner_id)?
            .unwrap_or_else(|| TargetList::new(owner_id, BTreeSet::new()));
        if !list.nicknames.insert(nickname.clone()) {
            return Err(TargetError::AlreadyPresent(nickname));
        }
        list.updated_at = Utc::now();
        self.save(&list)?;
        tracing::info!(owner = owner_id, nickname = %nickname, "target added");
        Ok(list)
    }

    fn remove(&self, owner_id: &str, nickname: &str) -> Result<TargetList, TargetError> {
        let nickname = normalize_nickname(nickname)?;
        let Some(mut list) = self.load(owner_id)? else {
            return Err(TargetError::NotPresent(nickname));
        };
        if !list.nicknames.remove(&nickname) {
            return Err(TargetError::NotPresent(nickname));
        }
        list.updated_at = Utc::now();
        self.save(&list)?;
        tracing::info!(owner = owner_id, nickname = %nickname, "target removed");
        Ok(list)
    }
}

/// Process-local store, used by tests and dry runs.
#[derive(Default)]
pub struct MemoryTargetStore {
    lists: Mutex<HashMap<String, TargetList>>,
}

impl MemoryTargetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_targets<I, S>(owner_id: &str, nicknames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        let list = TargetList::new(owner_id, nicknames.into_iter().map(Into::into).collect());
        if let Ok(mut lists) = store.lists.lock() {
            lists.insert(owner_id.to_string(), list);
        }
        store
    }
}

impl TargetStore for MemoryTargetStore {
    fn load(&self, owner_id: &str) -> Result<Option<TargetList>, TargetError> {
        let lists = self
            .lists
            .lock()
            .map_err(|_| TargetError::Storage("target store lock poisoned".to_string()))?;
        Ok(lists.get(owner_id).cloned())
    }

    fn save(&self, list: &TargetList) -> Result<(), TargetError> {
        let mut lists = self
            .lists
            .lock()
            .map_err(|_| TargetError::Storage("target store lock poisoned".to_string()))?;
        lists.insert(list.owner_id.clone(), list.clone());
        Ok(())
    }
}
