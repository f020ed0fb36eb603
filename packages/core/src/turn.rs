use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where a message arrived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    /// One-on-one conversation
    Direct,
    /// Shared channel with multiple participants
    Group,
}

/// A reference to an attachment on the inbound message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// Platform URL or handle for the attachment
    pub url: String,

    /// MIME type if the platform reported one
    pub content_type: Option<String>,
}

/// The unit of pipeline processing: one user message awaiting a response.
///
/// Immutable once constructed; all per-turn working state lives in the
/// intelligence bundle instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Opaque platform user identifier
    pub user_id: String,

    /// Character instance this turn is addressed to
    pub character_id: String,

    /// Originating platform name
    pub platform: String,

    /// Direct or group channel
    pub channel_type: ChannelType,

    /// Message text
    pub content: String,

    /// Zero or more attachment references
    pub attachments: Vec<Attachment>,

    /// Platform ingress timestamp
    pub received_at: DateTime<Utc>,
}

impl Turn {
    /// Create a direct-channel turn with no attachments
    pub fn direct(
        user_id: impl Into<String>,
        character_id: impl Into<String>,
        platform: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            character_id: character_id.into(),
            platform: platform.into(),
            channel_type: ChannelType::Direct,
            content: content.into(),
            attachments: Vec::new(),
            received_at: Utc::now(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// What the pipeline hands back to the platform adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    /// Final response text
    pub response_text: String,

    /// Whether a normal (non-canned) response was produced
    pub success: bool,

    /// Wall time spent in the pipeline
    pub processing_time_ms: u64,

    /// Free-form observability map; no semantics depend on it
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ProcessingResult {
    pub fn success(response_text: impl Into<String>, processing_time_ms: u64) -> Self {
        Self {
            response_text: response_text.into(),
            success: true,
            processing_time_ms,
            metadata: HashMap::new(),
        }
    }

    pub fn failure(response_text: impl Into<String>, processing_time_ms: u64) -> Self {
        Self {
            response_text: response_text.into(),
            success: false,
            processing_time_ms,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
