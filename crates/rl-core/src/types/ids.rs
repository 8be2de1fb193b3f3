use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;
use utoipa::ToSchema;

const ID_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(as = String)]
pub struct CommentId(String);

impl CommentId {
    /// A short id drawn from the random half of a fresh ULID.
    pub fn generate() -> Self {
        let ulid = Ulid::new().to_string();
        Self(ulid[ulid.len() - ID_LEN..].to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CommentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
