use snafu::Snafu;
use std::fmt::{Debug, Display, Formatter};

/// The error returned when building a [`Registry`].
///
/// [`Registry`]: crate::Registry
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RegistryError {
    #[snafu(display("Resource type '{}' is already registered", type_name))]
    Duplicate { type_name: String },
}

/// This struct can serve as an `Error` type when you want to provide an error message, but have no
/// underlying error type. It allows a string to serve as an error. This can be useful for custom
/// (i.e. mock) implementations of the [`RemoteClient`].
///
/// # Example
///
/// ```
/// # use resource_agent::error::ErrorMessage;
/// # use resource_agent::RemoteError;
/// let error = RemoteError::transport(ErrorMessage::from("connection reset"));
/// assert!(!error.is_not_found());
/// ```
///
/// [`RemoteClient`]: crate::provider::RemoteClient
#[derive(Debug)]
pub struct ErrorMessage {
    message: String,
}

impl Display for ErrorMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.message, f)
    }
}

impl<S: Into<String>> From<S> for ErrorMessage {
    fn from(s: S) -> Self {
        Self { message: s.into() }
    }
}

impl std::error::Error for ErrorMessage {}
