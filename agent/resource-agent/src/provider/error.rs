use serde::{Deserialize, Serialize};
use serde_plain::{derive_display_from_serialize, derive_fromstr_from_deserialize};
use std::fmt::{Display, Formatter};

type Source = Box<dyn std::error::Error + Send + Sync + 'static>;

/// What a failed reconciliation left behind on the backend. Every [`ProviderError`] carries one
/// so that callers know whether cleanup is needed.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Resources {
    /// An object exists but its identity could not be derived, so it cannot be found or
    /// destroyed through the engine.
    Orphaned,
    /// An object exists under the identity reported with the error, e.g. a create that was
    /// accepted but never became active.
    Remaining,
    /// Nothing was left behind, e.g. a create rejected outright.
    Clear,
    Unknown,
}

impl Resources {
    pub fn message(&self) -> &'static str {
        match self {
            Resources::Orphaned => "An error left an orphaned object that cannot be destroyed",
            Resources::Remaining => "An error left an object behind that can be destroyed",
            Resources::Clear => "An error occurred but no object was left behind",
            Resources::Unknown => {
                "An error occurred and it is unknown whether or not an object was left behind"
            }
        }
    }

    /// True unless the backend is known to be clean.
    pub fn needs_cleanup(&self) -> bool {
        !matches!(self, Resources::Clear)
    }
}

impl Display for Resources {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Classifies a failure so callers can branch without parsing messages.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// The object is absent when it was required to exist.
    NotFound,
    /// The backend refused a call with an error that was not, or was no longer, retryable.
    Rejected,
    /// The backend reported a failure status, or a status outside of the expected sets.
    TerminalStatus,
    Timeout,
    /// The backend accepted a call but returned something unusable.
    Inconsistency,
    Cancelled,
    /// The desired spec or an identity key is invalid.
    Config,
    #[default]
    Other,
}

derive_display_from_serialize!(ErrorKind);
derive_fromstr_from_deserialize!(ErrorKind);

/// Lets callers report cleanup state from their own bookkeeping types.
///
/// ```
/// use resource_agent::provider::{AsResources, Resources};
///
/// struct Created(Option<String>);
///
/// impl AsResources for Created {
///     fn as_resources(&self) -> Resources {
///         match self.0 {
///             Some(_) => Resources::Remaining,
///             None => Resources::Clear,
///         }
///     }
/// }
///
/// assert_eq!(Created(None).as_resources(), Resources::Clear);
/// ```
pub trait AsResources {
    fn as_resources(&self) -> Resources;
}

impl AsResources for Resources {
    fn as_resources(&self) -> Resources {
        *self
    }
}

/// The error carried by every failed reconciliation. Renders as
/// `{resources}, {context}: {source}`, omitting whichever parts are absent.
#[derive(Debug)]
pub struct ProviderError {
    kind: ErrorKind,
    resources: Resources,
    context: Option<String>,
    source: Option<Source>,
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

impl ProviderError {
    fn build<R>(resources: R, context: Option<String>, source: Option<Source>) -> Self
    where
        R: AsResources,
    {
        Self {
            kind: ErrorKind::default(),
            resources: resources.as_resources(),
            context,
            source,
        }
    }

    pub fn new_with_source_and_context<R, S, E>(resources: R, context: S, source: E) -> Self
    where
        R: AsResources,
        S: Into<String>,
        E: Into<Source>,
    {
        Self::build(resources, Some(context.into()), Some(source.into()))
    }

    pub fn new_with_context<R, S>(resources: R, context: S) -> Self
    where
        R: AsResources,
        S: Into<String>,
    {
        Self::build(resources, Some(context.into()), None)
    }

    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn resources(&self) -> Resources {
        self.resources
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.resources, f)?;
        if let Some(context) = &self.context {
            write!(f, ", {}", context)?;
        }
        match &self.source {
            Some(source) => write!(f, ": {}", source),
            None => Ok(()),
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// `context` for `Result` and `Option`, producing a [`ProviderError`] of kind `Other`.
pub trait IntoProviderError<T> {
    fn context<R, S>(self, resources: R, message: S) -> ProviderResult<T>
    where
        R: AsResources,
        S: Into<String>;
}

impl<T, E> IntoProviderError<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context<R, S>(self, resources: R, message: S) -> ProviderResult<T>
    where
        R: AsResources,
        S: Into<String>,
    {
        self.map_err(|e| ProviderError::new_with_source_and_context(resources, message, e))
    }
}

impl<T> IntoProviderError<T> for Option<T> {
    fn context<R, S>(self, resources: R, message: S) -> ProviderResult<T>
    where
        R: AsResources,
        S: Into<String>,
    {
        self.ok_or_else(|| ProviderError::new_with_context(resources, message))
    }
}
