//! Notification payload shape
//!
//! A payload is a fallback text line plus a single colored attachment made
//! of Block Kit sections. It is what the formatter produces and what the
//! dispatcher sends for both creates and edits.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Rendered notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// Plain text used by notifications and clients without block support
    pub text: String,
    pub attachments: Vec<Attachment>,
}

/// Colored side-bar attachment holding the status blocks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub color: String,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { text: TextObject },
    Context { elements: Vec<TextObject> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextObject {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl TextObject {
    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self {
            kind: "mrkdwn".to_string(),
            text: text.into(),
        }
    }
}

impl Block {
    pub fn section(text: impl Into<String>) -> Self {
        Block::Section {
            text: TextObject::mrkdwn(text),
        }
    }

    pub fn context(text: impl Into<String>) -> Self {
        Block::Context {
            elements: vec![TextObject::mrkdwn(text)],
        }
    }

    fn texts(&self) -> Vec<&str> {
        match self {
            Block::Section { text } => vec![text.text.as_str()],
            Block::Context { elements } => elements.iter().map(|e| e.text.as_str()).collect(),
        }
    }
}

impl Payload {
    /// Every text fragment of the payload, in rendering order, one per line
    pub fn plain_text(&self) -> String {
        let mut lines = vec![self.text.clone()];
        for attachment in &self.attachments {
            for block in &attachment.blocks {
                lines.extend(block.texts().into_iter().map(str::to_string));
            }
        }
        lines.join("\n")
    }

    /// Hex SHA-256 over the rendered content
    ///
    /// Equal payloads always hash equal; the correlator compares hashes to
    /// skip edits that would not change the message.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.text.as_bytes());
        for attachment in &self.attachments {
            hasher.update([0x1e_u8]);
            hasher.update(attachment.color.as_bytes());
            for block in &attachment.blocks {
                let tag: &[u8] = match block {
                    Block::Section { .. } => b"section",
                    Block::Context { .. } => b"context",
                };
                hasher.update([0x1d_u8]);
                hasher.update(tag);
                for text in block.texts() {
                    hasher.update([0x1f_u8]);
                    hasher.update(text.as_bytes());
                }
            }
        }
        hex::encode(hasher.finalize())
    }
}

/// Identity of a message the platform accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedMessage {
    pub channel: String,
    pub message_id: String,
}
