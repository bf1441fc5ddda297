//! Step-tagged errors for the multi-step identity flows.

use serde::Serialize;
use thiserror::Error;

use quire_auth::ProvisionError;
use quire_core::{DomainError, Interrupted};

/// One step of a bootstrap, repair, owner or student flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    ValidateInput,
    CreateOrganization,
    FindOrganization,
    CreateSystemOwner,
    ConfirmSystemOwner,
    CreateOwner,
    ConfirmOwner,
    CreatePublicGroup,
    FindPublicGroup,
    AddOwnerToPublicGroup,
    CreateDefaultSpace,
    CreateStudent,
    AddStudentToPublicGroup,
    CreatePersonalSpace,
    ProvisionPersonalSpace,
}

impl core::fmt::Display for Step {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Step::ValidateInput => "validate input",
            Step::CreateOrganization => "create organization",
            Step::FindOrganization => "find organization",
            Step::CreateSystemOwner => "create system owner",
            Step::ConfirmSystemOwner => "confirm system owner",
            Step::CreateOwner => "create owner",
            Step::ConfirmOwner => "confirm owner",
            Step::CreatePublicGroup => "create public group",
            Step::FindPublicGroup => "find public group",
            Step::AddOwnerToPublicGroup => "add owner to public group",
            Step::CreateDefaultSpace => "create default space",
            Step::CreateStudent => "create student",
            Step::AddStudentToPublicGroup => "add student to public group",
            Step::CreatePersonalSpace => "create personal space",
            Step::ProvisionPersonalSpace => "provision personal space",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StepFailure {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),

    #[error(transparent)]
    Provision(#[from] ProvisionError),
}

/// A flow aborted at `step`. Earlier steps stay committed; nothing is rolled back.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{step} failed: {source}")]
pub struct HierarchyError {
    pub step: Step,
    #[source]
    pub source: StepFailure,
}

impl HierarchyError {
    pub fn new(step: Step, source: impl Into<StepFailure>) -> Self {
        Self {
            step,
            source: source.into(),
        }
    }

    pub fn domain(&self) -> Option<&DomainError> {
        match &self.source {
            StepFailure::Domain(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_already_exists(&self) -> bool {
        self.domain().is_some_and(DomainError::is_already_exists)
    }

    pub fn is_not_found(&self) -> bool {
        self.domain().is_some_and(DomainError::is_not_found)
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self.source, StepFailure::Interrupted(_))
    }
}

/// Tag a step's result with the step it came from.
pub(crate) trait AtStep<T> {
    fn at(self, step: Step) -> Result<T, HierarchyError>;
}

impl<T, E> AtStep<T> for Result<T, E>
where
    E: Into<StepFailure>,
{
    fn at(self, step: Step) -> Result<T, HierarchyError> {
        self.map_err(|e| HierarchyError::new(step, e))
    }
}
