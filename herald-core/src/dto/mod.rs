//! Data Transfer Objects
//!
//! Wire shapes exchanged with the external platforms: the Kubernetes API
//! serving pipeline activity and user resources, and the messaging platform
//! receiving rendered notifications.

pub mod kube;
pub mod message;
pub mod slack;
