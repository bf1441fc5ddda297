use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Action identifier.
///
/// The engine treats actions as opaque strings; the constants below are the
/// ones the content backend uses, and callers may introduce their own.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Action(Cow<'static, str>);

impl Action {
    pub const READ: Action = Action(Cow::Borrowed("read"));
    pub const UPDATE: Action = Action(Cow::Borrowed("update"));
    pub const REMOVE: Action = Action(Cow::Borrowed("remove"));
    pub const WRITE: Action = Action(Cow::Borrowed("write"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The grant set every writer role receives when a workbook is created.
    pub fn full_control() -> [Action; 3] {
        [Action::READ, Action::UPDATE, Action::REMOVE]
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
