//! Administration surface for the allow-list. Every call answers with the full
//! resulting set so clients can reconcile without a second read.

use super::{parse_nickname_list, TargetError, TargetList, TargetStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum TargetAdminRequest {
    List,
    Add { nickname: String },
    /// Bulk replace from a newline-delimited nickname file.
    InitFromFile { contents: String },
    Remove { nickname: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetAdminResponse {
    pub success: bool,
    pub targets: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub struct TargetAdmin {
    store: Arc<dyn TargetStore>,
    owner_id: String,
}

impl TargetAdmin {
    pub fn new(store: Arc<dyn TargetStore>, owner_id: impl Into<String>) -> Self {
        Self {
            store,
            owner_id: owner_id.into(),
        }
    }

    pub fn handle(&self, request: TargetAdminRequest) -> TargetAdminResponse {
        let owner = self.owner_id.as_str();
        let result = match request {
            TargetAdminRequest::List => match self.store.get(owner) {
                Err(TargetError::NotFound(_)) => {
                    return TargetAdminResponse {
                        success: true,
                        targets: Vec::new(),
                        updated_at: None,
                        message: None,
                    }
                }
                other => other,
            },
            TargetAdminRequest::Add { nickname } => self.store.add(owner, &nickname),
            TargetAdminRequest::InitFromFile { contents } => {
                self.store.replace(owner, parse_nickname_list(&contents))
            }
            TargetAdminRequest::Remove { nickname } => self.store.remove(owner, &nickname),
        };

        match result {
            Ok(list) => Self::ok(&list),
            Err(e) => {
                if e.is_soft() {
                    tracing::debug!(owner, error = %e, "target admin no-op");
                } else {
                    tracing::warn!(owner, error = %e, "target admin request failed");
                }
                let current = self.store.load(owner).ok().flatten();
                TargetAdminResponse {
                    success: false,
                    targets: current
                        .as_ref()
                        .map(|l| l.nicknames.iter().cloned().collect())
                        .unwrap_or_default(),
                    updated_at: current.map(|l| l.updated_at),
                    message: Some(e.to_string()),
                }
            }
        }
    }

    fn ok(list: &TargetList) -> TargetAdminResponse {
        TargetAdminResponse {
            success: true,
            targets: list.nicknames.iter().cloned().collect(),
            updated_at: Some(list.updated_at),
            message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::targets::{MemoryTargetStore, DEFAULT_OWNER};

    fn admin() -> TargetAdmin {
        let store = Arc::new(MemoryTargetStore::with_targets(DEFAULT_OWNER, ["alice", "bob"]));
        TargetAdmin::new(store, DEFAULT_OWNER)
    }

    #[test]
    fn test_list_on_empty_store_is_empty_success() {
        let admin = TargetAdmin::new(Arc::new(MemoryTargetStore::new()), DEFAULT_OWNER);
        let resp = admin.handle(TargetAdminRequest::List);
        assert!(resp.success);
        assert!(resp.targets.is_empty());
    }

    #[test]
    fn test_add_returns_full_set() {
        let resp = admin().handle(TargetAdminRequest::Add {
            nickname: "carol".to_string(),
        });
        assert!(resp.success);
        assert_eq!(resp.targets, vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn test_duplicate_add_reports_failure_with_current_set() {
        let resp = admin().handle(TargetAdminRequest::Add {
            nickname: "alice".to_string(),
        });
        assert!(!resp.success);
        assert_eq!(resp.targets, vec!["alice", "bob"]);
        assert!(resp.message.unwrap().contains("already present"));
    }

    #[test]
    fn test_init_from_file_replaces_set() {
        let resp = admin().handle(TargetAdminRequest::InitFromFile {
            contents: "dana\n\nerin\n# skip me\ndana\n".to_string(),
        });
        assert!(resp.success);
        assert_eq!(resp.targets, vec!["dana", "erin"]);
    }

    #[test]
    fn test_remove_absent() {
        let resp = admin().handle(TargetAdminRequest::Remove {
            nickname: "carol".to_string(),
        });
        assert!(!resp.success);
        assert_eq!(resp.targets, vec!["alice", "bob"]);
    }

    #[test]
    fn test_request_deserializes_from_tagged_json() {
        let req: TargetAdminRequest =
            serde_json::from_str(r#"{"action":"add","nickname":"zed"}"#).unwrap();
        assert_eq!(
            req,
            TargetAdminRequest::Add {
                nickname: "zed".to_string()
            }
        );
        let req: TargetAdminRequest =
            serde_json::from_str(r#"{"action":"initFromFile","contents":"a\nb"}"#).unwrap();
        assert!(matches!(req, TargetAdminRequest::InitFromFile { .. }));
    }
}
