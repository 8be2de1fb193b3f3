use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use utoipa::ToSchema;

use super::{CommentId, CommentKind, CommentStatus, DiffSide, DocumentStatus, ThreadAuthor};

/// Current on-disk schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Round counter for a freshly created document.
pub const INITIAL_ROUND: u32 = 1;

/// The persisted review state for one branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDocument {
    pub version: u32,
    pub round: u32,
    pub status: DocumentStatus,
    #[serde(rename = "ref")]
    pub base_ref: String,
    pub branch: String,
    #[schema(value_type = Object)]
    pub metadata: Map<String, Value>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub comments: Vec<Comment>,
    pub summary: Option<Summary>,
}

impl ReviewDocument {
    pub fn empty(base_ref: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            version: SCHEMA_VERSION,
            round: INITIAL_ROUND,
            status: DocumentStatus::Draft,
            base_ref: base_ref.into(),
            branch: branch.into(),
            metadata: Map::new(),
            submitted_at: None,
            comments: Vec::new(),
            summary: None,
        }
    }

    pub fn comment(&self, id: &CommentId) -> Option<&Comment> {
        self.comments.iter().find(|c| &c.id == id)
    }

    pub fn comment_mut(&mut self, id: &CommentId) -> Option<&mut Comment> {
        self.comments.iter_mut().find(|c| &c.id == id)
    }

    /// Derive the document status from its comments.
    ///
    /// Without comments the document is a draft until it has ever been
    /// submitted. With comments it is resolved once every comment is.
    pub fn recompute_status(&mut self) {
        self.status = if self.comments.is_empty() {
            if self.submitted_at.is_some() {
                DocumentStatus::Submitted
            } else {
                DocumentStatus::Draft
            }
        } else if self
            .comments
            .iter()
            .all(|c| c.status == CommentStatus::Resolved)
        {
            DocumentStatus::Resolved
        } else {
            DocumentStatus::Submitted
        };
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    #[serde(rename = "type", default)]
    pub kind: CommentKind,
    pub file: String,
    pub line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    #[serde(default)]
    pub side: DiffSide,
    pub body: String,
    pub status: CommentStatus,
    /// Legacy single-reply field, superseded by `thread`.
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub thread: Vec<ThreadEntry>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ThreadEntry {
    pub author: ThreadAuthor,
    pub body: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub global: String,
    #[serde(default)]
    pub files: BTreeMap<String, String>,
    #[serde(default)]
    pub test_plan: Vec<TestPlanItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TestPlanItem {
    pub description: String,
    pub expected: String,
}

/// A document exercising every optional field, for persistence tests.
#[cfg(test)]
pub(crate) fn populated_document(branch: &str) -> ReviewDocument {
    let at = |s: &str| s.parse::<DateTime<Utc>>().unwrap();
    let mut metadata = Map::new();
    metadata.insert("agent".to_string(), Value::from("claude"));
    metadata.insert("round".to_string(), serde_json::json!({"seen": [1, 2]}));
    ReviewDocument {
        version: SCHEMA_VERSION,
        round: 3,
        status: DocumentStatus::Submitted,
        base_ref: "origin/main".to_string(),
        branch: branch.to_string(),
        metadata,
        submitted_at: Some(at("2026-03-01T09:00:00.123456789Z")),
        comments: vec![
            Comment {
                id: CommentId::from("01HZZZRANGE"),
                kind: CommentKind::Comment,
                file: "src/old.rs".to_string(),
                line: 10,
                end_line: Some(14),
                side: DiffSide::Old,
                body: "why was this removed?".to_string(),
                status: CommentStatus::Resolved,
                response: Some("restored it".to_string()),
                thread: vec![
                    ThreadEntry {
                        author: ThreadAuthor::Ai,
                        body: "restored it".to_string(),
                        created_at: None,
                    },
                    ThreadEntry {
                        author: ThreadAuthor::User,
                        body: "thanks".to_string(),
                        created_at: Some(at("2026-03-01T10:05:00Z")),
                    },
                ],
                created_at: at("2026-03-01T09:00:00.123456789Z"),
                resolved_at: Some(at("2026-03-01T10:00:00Z")),
            },
            Comment {
                id: CommentId::from("01HZZZSINGLE"),
                kind: CommentKind::Comment,
                file: "src/new.rs".to_string(),
                line: 2,
                end_line: None,
                side: DiffSide::New,
                body: "typo".to_string(),
                status: CommentStatus::Pending,
                response: None,
                thread: Vec::new(),
                created_at: at("2026-03-01T09:01:00Z"),
                resolved_at: None,
            },
        ],
        summary: Some(Summary {
            global: "restores the old path".to_string(),
            files: BTreeMap::from([
                ("src/new.rs".to_string(), "adds the helper".to_string()),
                ("src/old.rs".to_string(), String::new()),
            ]),
            test_plan: vec![TestPlanItem {
                description: "open the viewer".to_string(),
                expected: "both comments render".to_string(),
            }],
        }),
    }
}
