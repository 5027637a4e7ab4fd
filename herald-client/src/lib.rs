//! Herald HTTP Clients
//!
//! Type-safe HTTP clients for the two platforms the bot talks to:
//! - [`SlackClient`]: posts and edits notification messages and looks up users
//! - [`ClusterClient`]: lists and watches `PipelineActivity` records and lists
//!   the cluster-side `User` resources linking git identities to Slack handles
//!
//! # Example
//!
//! ```no_run
//! use herald_client::SlackClient;
//! use herald_core::dto::message::Payload;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = SlackClient::new("xoxb-token");
//!
//!     let payload = Payload {
//!         text: "acme/api build #1 Running".to_string(),
//!         attachments: vec![],
//!     };
//!     let posted = client.post_message("#builds", &payload).await?;
//!
//!     println!("Posted message {}", posted.message_id);
//!     Ok(())
//! }
//! ```

pub mod cluster;
pub mod error;
pub mod slack;

// Re-export commonly used types
pub use cluster::{ClusterClient, TokenSource, WatchStream};
pub use error::{ClientError, Result};
pub use slack::SlackClient;
