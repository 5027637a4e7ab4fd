//! Resolved user domain types

use serde::{Deserialize, Serialize};

/// How a commit author was matched to a messaging-platform user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionMethod {
    /// The commit email matched a directory entry
    ExactEmail,
    /// A cluster-side user resource linked the git identity to a handle
    Username,
    Unresolved,
}

/// Messaging-platform identity derived from a commit author
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedUser {
    /// Platform user id; `None` when unresolved
    pub user_id: Option<String>,
    pub display_name: String,
    pub method: ResolutionMethod,
}

impl ResolvedUser {
    pub fn resolved(
        user_id: impl Into<String>,
        display_name: impl Into<String>,
        method: ResolutionMethod,
    ) -> Self {
        Self {
            user_id: Some(user_id.into()),
            display_name: display_name.into(),
            method,
        }
    }

    /// Fallback carrying only the raw author name
    pub fn unresolved(author_name: impl Into<String>) -> Self {
        Self {
            user_id: None,
            display_name: author_name.into(),
            method: ResolutionMethod::Unresolved,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.user_id.is_some() && self.method != ResolutionMethod::Unresolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_user() {
        let user = ResolvedUser::unresolved("Jane Dev");
        assert!(!user.is_resolved());
        assert_eq!(user.display_name, "Jane Dev");
        assert_eq!(user.method, ResolutionMethod::Unresolved);
    }

    #[test]
    fn test_resolved_user() {
        let user = ResolvedUser::resolved("U123", "jane", ResolutionMethod::ExactEmail);
        assert!(user.is_resolved());
        assert_eq!(user.user_id.as_deref(), Some("U123"));
    }
}
