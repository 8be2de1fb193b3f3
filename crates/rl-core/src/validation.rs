use crate::error::ReviewError;
use crate::types::{CommentPatch, NewComment, Patch, ReviewDocument, Summary};
use std::collections::HashSet;

fn invalid(message: &str) -> ReviewError {
    ReviewError::InvalidInput {
        message: message.to_string(),
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn validate_anchor(file: &str, line: u32, end_line: Option<u32>) -> Result<(), ReviewError> {
    if is_blank(file) {
        return Err(invalid("file must not be empty"));
    }
    if line == 0 {
        return Err(invalid("line must be at least 1"));
    }
    if let Some(end) = end_line {
        if end < line {
            return Err(invalid("endLine must not precede line"));
        }
    }
    Ok(())
}

pub fn validate_new_comment(input: &NewComment) -> Result<(), ReviewError> {
    validate_anchor(&input.file, input.line, input.end_line)?;
    if is_blank(&input.body) {
        return Err(invalid("body must not be empty"));
    }
    Ok(())
}

pub fn validate_comment_patch(patch: &CommentPatch) -> Result<(), ReviewError> {
    if patch.is_empty() {
        return Err(invalid("update must set at least one field"));
    }
    if let Patch::Set(body) = &patch.body {
        if is_blank(body) {
            return Err(invalid("body must not be empty"));
        }
    }
    if let Patch::Set(reply) = &patch.reply {
        if is_blank(reply) {
            return Err(invalid("reply must not be empty"));
        }
    }
    Ok(())
}

pub fn validate_summary(summary: &Summary) -> Result<(), ReviewError> {
    if is_blank(&summary.global) {
        return Err(invalid("summary.global must not be empty"));
    }
    // File notes may be blank; only the path key is required.
    if summary.files.keys().any(|file| is_blank(file)) {
        return Err(invalid("summary.files paths must not be empty"));
    }
    for item in &summary.test_plan {
        if is_blank(&item.description) || is_blank(&item.expected) {
            return Err(invalid(
                "summary.testPlan items need a description and an expected result",
            ));
        }
    }
    Ok(())
}

/// Structural checks applied to every document read from disk.
pub fn validate_document(document: &ReviewDocument) -> Result<(), ReviewError> {
    let mut seen = HashSet::new();
    for comment in &document.comments {
        if !seen.insert(comment.id.as_str()) {
            return Err(ReviewError::InvalidInput {
                message: format!("duplicate comment id {}", comment.id),
            });
        }
        validate_anchor(&comment.file, comment.line, comment.end_line)?;
        if comment.thread.iter().any(|entry| is_blank(&entry.body)) {
            return Err(invalid("thread entries must have a body"));
        }
    }
    if let Some(summary) = &document.summary {
        validate_summary(summary)?;
    }
    Ok(())
}
