//! Typed references between service definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What to do when a referenced service does not exist.
///
/// The policy belongs to the reference, not to the target: two services can
/// reference the same missing id with different outcomes.
///
/// # Examples
///
/// ```rust
/// use di_compiler::{InvalidBehavior, Reference};
///
/// assert_eq!(Reference::new("mailer").behavior, InvalidBehavior::ExceptionOnInvalid);
/// assert_eq!(Reference::null_on_invalid("mailer").behavior, InvalidBehavior::NullOnInvalid);
/// assert_eq!(Reference::ignore_on_invalid("mailer").behavior, InvalidBehavior::IgnoreOnInvalid);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidBehavior {
    /// Fail compilation with `ServiceNotFound`.
    #[default]
    ExceptionOnInvalid,
    /// Substitute `null` and carry on.
    NullOnInvalid,
    /// Drop the list element, map entry, property or whole method call.
    /// A top-level constructor argument becomes `null` so later positions hold.
    IgnoreOnInvalid,
}

/// A pointer from a definition slot to another service id.
///
/// `deferred` is set by the circular reference check when this particular
/// slot must receive a lazy proxy instead of the constructed target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub id: String,
    #[serde(default)]
    pub behavior: InvalidBehavior,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deferred: bool,
}

impl Reference {
    /// A required reference.
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_behavior(id, InvalidBehavior::ExceptionOnInvalid)
    }

    /// A reference replaced by `null` when the target is missing.
    pub fn null_on_invalid(id: impl Into<String>) -> Self {
        Self::with_behavior(id, InvalidBehavior::NullOnInvalid)
    }

    /// A reference elided entirely when the target is missing.
    pub fn ignore_on_invalid(id: impl Into<String>) -> Self {
        Self::with_behavior(id, InvalidBehavior::IgnoreOnInvalid)
    }

    pub fn with_behavior(id: impl Into<String>, behavior: InvalidBehavior) -> Self {
        Self {
            id: id.into(),
            behavior,
            deferred: false,
        }
    }

    pub fn is_required(&self) -> bool {
        self.behavior == InvalidBehavior::ExceptionOnInvalid
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.behavior {
            InvalidBehavior::ExceptionOnInvalid => write!(f, "@{}", self.id),
            InvalidBehavior::NullOnInvalid => write!(f, "@?{}", self.id),
            InvalidBehavior::IgnoreOnInvalid => write!(f, "@!{}", self.id),
        }
    }
}
