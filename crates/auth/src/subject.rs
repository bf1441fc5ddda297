use serde::{Deserialize, Serialize};

use quire_core::AppUserId;

/// Identity of a principal in the authorization model.
///
/// Subjects are never persisted as rows of their own; they are computed from
/// the app user's numeric ID on demand.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Subject(String);

impl Subject {
    pub fn for_user(user_id: AppUserId) -> Self {
        Self(format!("user_{user_id}"))
    }

    /// Wrap an already-derived subject string (e.g. one read back from storage).
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Subject {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<AppUserId> for Subject {
    fn from(value: AppUserId) -> Self {
        Self::for_user(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_is_derived_from_user_id() {
        assert_eq!(Subject::for_user(AppUserId::new(7)).as_str(), "user_7");
        assert_eq!(Subject::from(AppUserId::new(8)), Subject::new("user_8"));
    }
}
