//! Decoding of on-disk review documents into the current schema.
//!
//! Older shapes are upgraded on the raw JSON value before typed decoding, so
//! the rest of the crate only ever sees [`ReviewDocument`] at
//! [`SCHEMA_VERSION`].

use crate::types::document::{INITIAL_ROUND, SCHEMA_VERSION};
use crate::types::ReviewDocument;
use crate::validation::validate_document;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentDecodeError {
    #[error("invalid json: {0}")]
    Json(String),
    #[error("document root is not an object")]
    NotAnObject,
    #[error("unsupported schema version {0}")]
    UnsupportedVersion(u64),
    #[error("schema violation: {0}")]
    Schema(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub document: ReviewDocument,
    /// The stored bytes differ from the current shape and should be rewritten.
    pub changed: bool,
    /// The document had no branch and took the current one.
    pub adopted_branch: bool,
}

pub fn decode(bytes: &[u8], current_branch: &str) -> Result<Decoded, DocumentDecodeError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|err| DocumentDecodeError::Json(err.to_string()))?;
    let Value::Object(mut root) = value else {
        return Err(DocumentDecodeError::NotAnObject);
    };

    let version = match root.get("version") {
        None | Some(Value::Null) => 0,
        Some(Value::Number(n)) => n.as_u64().ok_or_else(|| {
            DocumentDecodeError::Schema(format!("invalid version {n}"))
        })?,
        Some(other) => {
            return Err(DocumentDecodeError::Schema(format!(
                "invalid version {other}"
            )));
        }
    };
    if version > u64::from(SCHEMA_VERSION) {
        return Err(DocumentDecodeError::UnsupportedVersion(version));
    }

    let mut changed = version < u64::from(SCHEMA_VERSION);
    changed |= fill_defaults(&mut root)?;
    changed |= fold_legacy_responses(&mut root);
    let adopted_branch = adopt_branch(&mut root, current_branch);
    changed |= adopted_branch;

    let document: ReviewDocument = serde_json::from_value(Value::Object(root))
        .map_err(|err| DocumentDecodeError::Schema(err.to_string()))?;
    validate_document(&document).map_err(|err| DocumentDecodeError::Schema(err.to_string()))?;

    Ok(Decoded {
        document,
        changed,
        adopted_branch,
    })
}

fn insert_missing(object: &mut Map<String, Value>, key: &str, value: Value) -> bool {
    match object.get(key) {
        Some(_) => false,
        None => {
            object.insert(key.to_string(), value);
            true
        }
    }
}

fn fill_defaults(root: &mut Map<String, Value>) -> Result<bool, DocumentDecodeError> {
    let mut changed = false;
    if root.get("version") != Some(&Value::from(SCHEMA_VERSION)) {
        root.insert("version".to_string(), Value::from(SCHEMA_VERSION));
        changed = true;
    }
    changed |= insert_missing(root, "round", Value::from(INITIAL_ROUND));
    changed |= insert_missing(root, "status", Value::from("draft"));
    changed |= insert_missing(root, "metadata", Value::Object(Map::new()));
    changed |= insert_missing(root, "submittedAt", Value::Null);
    changed |= insert_missing(root, "summary", Value::Null);
    changed |= insert_missing(root, "comments", Value::Array(Vec::new()));

    let Some(Value::Array(comments)) = root.get_mut("comments") else {
        return Err(DocumentDecodeError::Schema(
            "comments must be an array".to_string(),
        ));
    };
    for comment in comments {
        let Value::Object(comment) = comment else {
            return Err(DocumentDecodeError::Schema(
                "comment must be an object".to_string(),
            ));
        };
        changed |= insert_missing(comment, "type", Value::from("comment"));
        changed |= insert_missing(comment, "thread", Value::Array(Vec::new()));
        changed |= insert_missing(comment, "response", Value::Null);
        changed |= insert_missing(comment, "resolvedAt", Value::Null);
    }
    Ok(changed)
}

/// Move a legacy `response` into the thread as a single agent entry.
///
/// `response` itself stays in place for older readers.
fn fold_legacy_responses(root: &mut Map<String, Value>) -> bool {
    let Some(Value::Array(comments)) = root.get_mut("comments") else {
        return false;
    };
    let mut changed = false;
    for comment in comments.iter_mut().filter_map(Value::as_object_mut) {
        let response = match comment.get("response") {
            Some(Value::String(text)) if !text.trim().is_empty() => text.clone(),
            _ => continue,
        };
        let thread_empty = comment
            .get("thread")
            .and_then(Value::as_array)
            .is_none_or(Vec::is_empty);
        if !thread_empty {
            continue;
        }
        let entry = serde_json::json!({
            "author": "ai",
            "body": response,
            "createdAt": comment.get("resolvedAt").cloned().unwrap_or(Value::Null),
        });
        comment.insert("thread".to_string(), Value::Array(vec![entry]));
        changed = true;
    }
    changed
}

fn adopt_branch(root: &mut Map<String, Value>, current_branch: &str) -> bool {
    match root.get("branch") {
        Some(Value::String(_)) => false,
        _ => {
            root.insert("branch".to_string(), Value::from(current_branch));
            true
        }
    }
}
