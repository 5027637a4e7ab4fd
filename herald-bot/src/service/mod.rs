//! Service layer
//!
//! The notification pipeline: the resolver names the commit author, the
//! formatter renders a snapshot, the correlator decides between create and
//! edit, and the dispatcher performs the call. Services receive their
//! repositories at construction and hold no global state.

pub mod backoff;
pub mod correlator;
pub mod dispatcher;
pub mod formatter;
pub mod resolver;

pub use correlator::Correlator;
pub use dispatcher::Dispatcher;
pub use formatter::MessageFormatter;
pub use resolver::IdentityResolver;
