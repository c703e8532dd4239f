use crate::constants::{DEFAULT_IDENTITY_SEPARATOR, SINGLE_IDENTITY_PART};
use crate::error::{self, Error, Result};
use serde::{Deserialize, Serialize};
use snafu::ensure;
use std::fmt::{Display, Formatter};

/// The stable string used to re-locate a remote object across calls. Once assigned at create time
/// it never changes for the life of the object; a new identity only comes from a delete followed
/// by a create.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for IdentityKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl AsRef<str> for IdentityKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for IdentityKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for IdentityKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Describes how an [`IdentityKey`] is built from user-supplied values. A single-part shape uses
/// the backend-assigned id verbatim. A composite shape joins its parts with a separator, e.g.
/// `cluster-name:addon-name`, and must be reconstructible by parsing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IdentityShape {
    separator: &'static str,
    parts: &'static [&'static str],
}

impl IdentityShape {
    /// A backend-assigned single string id.
    pub const SINGLE: IdentityShape = IdentityShape {
        separator: DEFAULT_IDENTITY_SEPARATOR,
        parts: &[SINGLE_IDENTITY_PART],
    };

    /// A composite key with the named `parts` joined by `separator`.
    pub const fn composite(separator: &'static str, parts: &'static [&'static str]) -> Self {
        Self { separator, parts }
    }

    pub fn separator(&self) -> &'static str {
        self.separator
    }

    pub fn parts(&self) -> &'static [&'static str] {
        self.parts
    }

    pub fn is_composite(&self) -> bool {
        self.parts.len() > 1
    }

    /// A human readable description of the key format, e.g. `CLUSTER-NAME:ADDON-NAME`.
    pub fn format(&self) -> String {
        self.parts
            .iter()
            .map(|part| part.to_uppercase().replace('_', "-"))
            .collect::<Vec<_>>()
            .join(self.separator)
    }

    /// Build an identity from one value per part.
    pub fn build(&self, values: &[&str]) -> Result<IdentityKey> {
        ensure!(
            values.len() == self.parts.len(),
            error::IdentityPartCountSnafu {
                expected: self.parts.len(),
                names: self.parts.join(", "),
                actual: values.len(),
            }
        );
        for (part, value) in self.parts.iter().zip(values) {
            ensure!(!value.is_empty(), error::IdentityEmptyPartSnafu { part: *part });
            if self.is_composite() {
                ensure!(
                    !value.contains(self.separator),
                    error::IdentitySeparatorSnafu {
                        part: *part,
                        value: *value,
                        separator: self.separator,
                    }
                );
            }
        }
        Ok(IdentityKey::new(values.join(self.separator)))
    }

    /// Split an identity back into its parts, in the order they were declared.
    pub fn parse<'a>(&self, key: &'a IdentityKey) -> Result<Vec<&'a str>> {
        let values: Vec<&str> = if self.is_composite() {
            key.as_str().split(self.separator).collect()
        } else {
            vec![key.as_str()]
        };
        if values.len() != self.parts.len() || values.iter().any(|value| value.is_empty()) {
            return Err(self.mismatch(key));
        }
        Ok(values)
    }

    /// The error for a key that does not have this shape. Also used by callers whose parts have
    /// their own syntax, e.g. an enumerated value.
    pub fn mismatch(&self, key: &IdentityKey) -> Error {
        error::IdentityFormatSnafu {
            id: key.as_str(),
            expected: self.format(),
        }
        .build()
        .into()
    }
}
