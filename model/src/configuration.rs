use crate::error::{self, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use snafu::ResultExt;
use std::fmt::Debug;

/// The `Configuration` trait is for "plain old data" structs such as a resource type's desired
/// spec or the engine settings. These values travel through the resource registry as untyped
/// JSON, so the trait provides a way for callers to strongly type this data which is otherwise
/// unconstrained at the boundary.
pub trait Configuration:
    Serialize + DeserializeOwned + Clone + Debug + Default + Send + Sync + Sized + 'static
{
    /// Convert the `Configuration` object to a serde `Map`.
    fn into_map(self) -> Result<Map<String, Value>> {
        match self.into_value()? {
            Value::Object(map) => Ok(map),
            _ => Err(error::ConfigWrongValueTypeSnafu {}.build().into()),
        }
    }

    /// Convert the `Configuration` object to a serde `Value`.
    fn into_value(self) -> Result<Value> {
        Ok(serde_json::to_value(self).context(error::ConfigSerializationSnafu)?)
    }

    /// Deserialize the `Configuration` object from a serde `Map`.
    fn from_map(map: Map<String, Value>) -> Result<Self> {
        Self::from_value(Value::Object(map))
    }

    /// Deserialize the `Configuration` object from a serde `Value`.
    fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value).context(error::ConfigDeserializationSnafu)?)
    }
}
