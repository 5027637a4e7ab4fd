//! Repository layer
//!
//! Repositories are the capabilities the engine is given at construction:
//! reading pipeline activities and identities from the cluster, looking up
//! users in the messaging directory, and posting or editing messages. They
//! carry no business logic.
//!
//! All repositories are trait-based so tests can substitute in-memory fakes.

mod activities;
mod identities;
mod messages;

// Re-export traits
pub use activities::{ActivityEventStream, ActivityListing, ActivityRepository, StoreEvent};
pub use identities::{IdentityRepository, UserDirectory};
pub use messages::MessageRepository;
