use serde_json::Value;

pub const CONNECTED: &str = "connected";
pub const DOCUMENT_CHANGED: &str = "document-changed";
pub const DIFF_CHANGED: &str = "diff-changed";

/// Something viewers should hear about.
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewEvent {
    /// Sent once to a connection right after it joins.
    Connected,
    /// Carries the full current review document.
    DocumentChanged(Value),
    /// A hint to re-fetch the diff; carries no diff data.
    DiffChanged,
}

impl ReviewEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected => CONNECTED,
            Self::DocumentChanged(_) => DOCUMENT_CHANGED,
            Self::DiffChanged => DIFF_CHANGED,
        }
    }

    pub fn to_frame(&self) -> Frame {
        let data = match self {
            Self::DocumentChanged(document) => document.to_string(),
            Self::Connected | Self::DiffChanged => "{}".to_string(),
        };
        Frame {
            event: self.name(),
            data,
        }
    }
}

/// One server-sent event, already serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub event: &'static str,
    pub data: String,
}

impl Frame {
    /// Wire form: `event: <name>\ndata: <json>\n\n`.
    pub fn encode(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event, self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_frame_carries_payload() {
        let event = ReviewEvent::DocumentChanged(json!({"status": "draft", "comments": []}));
        let frame = event.to_frame();
        assert_eq!(frame.event, DOCUMENT_CHANGED);
        let encoded = frame.encode();
        assert!(encoded.starts_with("event: document-changed\ndata: "));
        assert!(encoded.ends_with("\n\n"));
        let data: Value = serde_json::from_str(&frame.data).unwrap();
        assert_eq!(data["status"], "draft");
    }

    #[test]
    fn test_diff_frame_is_payload_free() {
        assert_eq!(
            ReviewEvent::DiffChanged.to_frame().encode(),
            "event: diff-changed\ndata: {}\n\n"
        );
        assert_eq!(ReviewEvent::Connected.name(), CONNECTED);
    }
}
