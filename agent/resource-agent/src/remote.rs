use crate::retry::Cancelled;
use snafu::Snafu;

/// The error type returned by [`RemoteClient`] implementations. The engine only needs to tell
/// a handful of situations apart; everything else is carried as an API error code and message
/// so that per-resource retry predicates can inspect it.
///
/// [`RemoteClient`]: crate::provider::RemoteClient
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RemoteError {
    #[snafu(display("Remote object '{}' not found", id))]
    NotFound { id: String },

    #[snafu(display("{}: {}", code, message))]
    Api { code: String, message: String },

    #[snafu(display("Remote call returned an empty result: {}", what))]
    EmptyResult { what: String },

    #[snafu(display("Remote client does not support '{}'", operation))]
    Unsupported { operation: String },

    #[snafu(display("Remote call was cancelled"))]
    Cancelled {},

    #[snafu(display("Transport error: {}", source))]
    Transport {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

impl RemoteError {
    pub fn not_found<S: Into<String>>(id: S) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn api<C, M>(code: C, message: M) -> Self
    where
        C: Into<String>,
        M: Into<String>,
    {
        Self::Api {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn empty_result<S: Into<String>>(what: S) -> Self {
        Self::EmptyResult { what: what.into() }
    }

    pub fn unsupported<S: Into<String>>(operation: S) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    pub fn transport<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        Self::Transport {
            source: source.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RemoteError::Cancelled { .. })
    }

    /// The API error code, if this is an API error.
    pub fn code(&self) -> Option<&str> {
        match self {
            RemoteError::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    /// True if this is an API error with `code` whose message contains `needle`.
    pub fn is_api_error(&self, code: &str, needle: &str) -> bool {
        match self {
            RemoteError::Api {
                code: actual,
                message,
            } => actual == code && message.contains(needle),
            _ => false,
        }
    }
}

impl From<Cancelled> for RemoteError {
    fn from(_: Cancelled) -> Self {
        RemoteError::Cancelled {}
    }
}

#[cfg(test)]
mod test {
    use super::RemoteError;
    use crate::error::ErrorMessage;

    #[test]
    fn classification() {
        let error = RemoteError::api(
            "InvalidParameterException",
            "Addon status is CREATE_FAILED",
        );
        assert_eq!(error.code(), Some("InvalidParameterException"));
        assert!(error.is_api_error("InvalidParameterException", "CREATE_FAILED"));
        assert!(!error.is_api_error("InvalidParameterException", "does not exist"));
        assert!(!error.is_api_error("ResourceInUseException", "CREATE_FAILED"));
        assert!(RemoteError::not_found("x").is_not_found());
        assert!(RemoteError::not_found("x").code().is_none());
    }

    #[test]
    fn transport_display() {
        let error = RemoteError::transport(ErrorMessage::from("connection reset"));
        assert_eq!(error.to_string(), "Transport error: connection reset");
    }
}
