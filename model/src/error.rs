use snafu::Snafu;

#[derive(Debug, Snafu)]
pub struct Error(OpaqueError);
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub(crate) enum OpaqueError {
    #[snafu(display("Error deserializing configuration: {}", source))]
    ConfigDeserialization { source: serde_json::Error },

    #[snafu(display("Error serializing configuration: {}", source))]
    ConfigSerialization { source: serde_json::Error },

    #[snafu(display(
        "Error serializing configuration: expected Value::Object type but got something else."
    ))]
    ConfigWrongValueType {},

    #[snafu(display("Unable to parse environment variable '{}' value '{}': {}", key, value, source))]
    EnvParse {
        key: String,
        value: String,
        source: std::num::ParseIntError,
    },

    #[snafu(display("Identity part '{}' must not be empty", part))]
    IdentityEmptyPart { part: String },

    #[snafu(display(
        "Unexpected format of ID ('{}'), expected {}",
        id,
        expected
    ))]
    IdentityFormat { id: String, expected: String },

    #[snafu(display(
        "Identity requires {} part(s) ({}) but {} were provided",
        expected,
        names,
        actual
    ))]
    IdentityPartCount {
        expected: usize,
        names: String,
        actual: usize,
    },

    #[snafu(display(
        "Identity part '{}' value '{}' must not contain the separator '{}'",
        part,
        value,
        separator
    ))]
    IdentitySeparator {
        part: String,
        value: String,
        separator: String,
    },
}
