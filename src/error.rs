//! Error types for the service-container compiler and its runtime.

use std::path::PathBuf;

use thiserror::Error;

/// Compilation and runtime errors.
///
/// Every compilation error is fatal to the compilation attempt that produced
/// it: there is no partially compiled container. Runtime errors (`get`/`has`)
/// are local to the call and never corrupt the shared artifact.
///
/// # Examples
///
/// ```rust
/// use di_compiler::DiError;
///
/// let circular = DiError::FatalCircularReference {
///     chain: vec!["a".into(), "b".into(), "a".into()],
/// };
/// assert_eq!(
///     circular.to_string(),
///     "Circular reference detected for service \"a\", path: \"a -> b -> a\""
/// );
/// ```
#[derive(Debug, Error)]
pub enum DiError {
    /// A `%name%` placeholder or a `get_parameter` call named an unknown parameter.
    #[error("You have requested a non-existent parameter \"{name}\".{}", suggestion_suffix(.suggestion))]
    ParameterNotFound {
        name: String,
        suggestion: Option<String>,
    },

    /// A parameter appears in its own resolution chain.
    #[error("Circular reference detected for parameter \"{}\" ({}).", chain_head(.chain), closed_chain(.chain))]
    ParameterCircularReference { chain: Vec<String> },

    /// A non-scalar parameter was embedded inside a larger string.
    #[error("Invalid value for parameter \"{name}\": {message}")]
    InvalidParameterValue { name: String, message: String },

    /// Alias resolution did not terminate.
    #[error("Circular reference detected for alias \"{}\", path: \"{}\"", chain_head(.chain), .chain.join(" -> "))]
    AliasCircularReference { chain: Vec<String> },

    /// The requested id has neither a definition nor an alias.
    #[error("You have requested a non-existent service \"{id}\".{}", referenced_by_suffix(.referenced_by))]
    ServiceNotFound {
        id: String,
        referenced_by: Option<String>,
    },

    /// The id existed before compilation but a pass removed or inlined it.
    #[error("The \"{id}\" service or alias has been removed or inlined when the container was compiled.")]
    RemovedService { id: String },

    /// A private service was requested from outside the compiled container.
    #[error("The \"{id}\" service is private: it can only be injected into other services.")]
    PrivateService { id: String },

    /// A construction cycle made only of required edges.
    #[error("Circular reference detected for service \"{}\", path: \"{}\"", chain_head(.chain), .chain.join(" -> "))]
    FatalCircularReference { chain: Vec<String> },

    /// A definition is malformed or inconsistent with declared types.
    #[error("Invalid definition for service \"{id}\": {message}")]
    InvalidDefinition { id: String, message: String },

    /// A compiler pass failed; carries the identity of the pass.
    #[error("Compiler pass \"{pass}\" failed: {source}")]
    CompilerPassFailure {
        pass: String,
        #[source]
        source: Box<DiError>,
    },

    /// The real construction behind a lazy proxy failed. Never cached.
    #[error("Lazy proxy for service \"{id}\" could not construct its target: {source}")]
    ProxyConstructionFailure {
        id: String,
        #[source]
        source: Box<DiError>,
    },

    /// A registered factory reported an error while building a service.
    #[error("Service \"{id}\" could not be constructed: {message}")]
    ConstructionFailure { id: String, message: String },

    /// A service was requested again while it was still being constructed.
    #[error("Service requested while being constructed, path: \"{}\"", .chain.join(" -> "))]
    ReentrantConstruction { chain: Vec<String> },

    /// Filesystem failure while reading configuration or writing the cache.
    #[error("I/O error on \"{}\": {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A service configuration file is well-formed but not a valid service file.
    #[error("Invalid service file \"{}\": {message}", .path.display())]
    InvalidConfigFile { path: PathBuf, message: String },

    /// Artifact, sidecar or configuration (de)serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DiError {
    /// Shorthand for [`DiError::InvalidDefinition`].
    pub fn invalid(id: impl Into<String>, message: impl Into<String>) -> Self {
        DiError::InvalidDefinition {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Shorthand for [`DiError::ServiceNotFound`].
    pub fn not_found(id: impl Into<String>, referenced_by: Option<&str>) -> Self {
        DiError::ServiceNotFound {
            id: id.into(),
            referenced_by: referenced_by.map(str::to_string),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DiError::Io {
            path: path.into(),
            source,
        }
    }

    /// The id chain attached to cycle errors, if any.
    pub fn chain(&self) -> Option<&[String]> {
        match self {
            DiError::ParameterCircularReference { chain }
            | DiError::AliasCircularReference { chain }
            | DiError::FatalCircularReference { chain }
            | DiError::ReentrantConstruction { chain } => Some(chain),
            DiError::CompilerPassFailure { source, .. }
            | DiError::ProxyConstructionFailure { source, .. } => source.chain(),
            _ => None,
        }
    }

    /// Whether the error means "no such service", including removed ones.
    pub fn is_not_found(&self) -> bool {
        matches!(self.root_cause(), DiError::ServiceNotFound { .. } | DiError::RemovedService { .. })
    }

    /// Strips [`DiError::CompilerPassFailure`] and
    /// [`DiError::ProxyConstructionFailure`] wrappers.
    pub fn root_cause(&self) -> &DiError {
        match self {
            DiError::CompilerPassFailure { source, .. } | DiError::ProxyConstructionFailure { source, .. } => {
                source.root_cause()
            }
            other => other,
        }
    }
}

impl From<serde_json::Error> for DiError {
    fn from(err: serde_json::Error) -> Self {
        DiError::Serialization(err.to_string())
    }
}

#[cfg(feature = "yaml")]
impl From<serde_yaml::Error> for DiError {
    fn from(err: serde_yaml::Error) -> Self {
        DiError::Serialization(err.to_string())
    }
}

fn chain_head(chain: &[String]) -> &str {
    chain.first().map(String::as_str).unwrap_or_default()
}

fn closed_chain(chain: &[String]) -> String {
    chain
        .iter()
        .chain(chain.first())
        .map(|name| format!("\"{name}\""))
        .collect::<Vec<_>>()
        .join(" > ")
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(name) => format!(" Did you mean \"{name}\"?"),
        None => String::new(),
    }
}

fn referenced_by_suffix(referenced_by: &Option<String>) -> String {
    match referenced_by {
        Some(id) => format!(" It is referenced by service \"{id}\"."),
        None => String::new(),
    }
}

/// Result type for compiler and container operations.
pub type DiResult<T> = Result<T, DiError>;
