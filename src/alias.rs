//! Aliases: alternate names for a concrete service id.

use serde::{Deserialize, Serialize};

/// A name that resolves to another service id.
///
/// Resolving an alias never instantiates anything; it only rewrites ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    pub target: String,
    #[serde(default = "default_public")]
    pub public: bool,
    /// Deprecation message; `%alias_id%` is replaced by the alias name.
    #[serde(default)]
    pub deprecation: Option<String>,
}

fn default_public() -> bool {
    true
}

impl Alias {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            public: true,
            deprecation: None,
        }
    }

    pub fn private(mut self) -> Self {
        self.public = false;
        self
    }

    pub(crate) fn private_if(mut self, private: bool) -> Self {
        if private {
            self.public = false;
        }
        self
    }

    pub fn deprecate(mut self, message: impl Into<String>) -> Self {
        self.deprecation = Some(message.into());
        self
    }

    pub fn is_deprecated(&self) -> bool {
        self.deprecation.is_some()
    }

    /// Deprecation message for `alias_id`, if the alias is deprecated.
    pub fn deprecation_message(&self, alias_id: &str) -> Option<String> {
        self.deprecation
            .as_ref()
            .map(|template| template.replace("%alias_id%", alias_id))
    }
}

impl From<&str> for Alias {
    fn from(target: &str) -> Self {
        Alias::new(target)
    }
}

impl From<String> for Alias {
    fn from(target: String) -> Self {
        Alias::new(target)
    }
}
