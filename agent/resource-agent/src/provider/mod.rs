mod error;

pub use self::error::{
    AsResources, ErrorKind, IntoProviderError, ProviderError, ProviderResult, Resources,
};
use crate::remote::{RemoteError, RemoteResult};
use reconcile_model::{Configuration, IdentityKey};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};

/// Ties together the types that describe one kind of managed resource.
///
/// ## Custom Types
///
/// - `Spec` is the desired configuration the user declares. It is received as untyped JSON by
///   the [`Registry`] so it must be a [`Configuration`].
///
/// - `Request` is what the remote client needs in order to create the object, produced from the
///   `Spec` by [`StateMapper::to_remote`].
///
/// - `Object` is the backend's representation of the object and carries its status.
///
/// - `Delta` is the minimal set of changed fields sent on update.
///
/// - `Operation` is a handle to an asynchronous update that the backend tracks separately from
///   the object. Use [`Never`] if updates are synchronous.
///
/// - `Definition` is a full-definition document accepted by a bulk import call. Use [`Never`]
///   if the resource has no such call.
///
/// [`Registry`]: crate::Registry
pub trait ResourceKind: Send + Sync + 'static {
    /// The resource type name, e.g. `eks_addon`.
    const NAME: &'static str;

    type Spec: Configuration;
    type Request: Debug + Send + Sync;
    type Object: StatusSource + Serialize + Clone + Debug + Send + Sync + 'static;
    type Delta: Serialize + Debug + Send + Sync;
    type Operation: StatusSource + OperationHandle + Clone + Debug + Send + Sync + 'static;
    type Definition: PartialEq + Debug + Send + Sync;
}

/// Anything that carries a backend status string.
pub trait StatusSource {
    fn status(&self) -> Option<&str>;

    /// Structured details explaining a failure status. Every cause is reported, not just the
    /// first.
    fn failure_causes(&self) -> Vec<FailureCause> {
        Vec::new()
    }
}

/// An in-flight asynchronous mutation tracked by the backend.
pub trait OperationHandle {
    fn operation_id(&self) -> &str;
}

/// One structured reason for a failure status, rendered as `ids: code: message`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureCause {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub resource_ids: Vec<String>,
}

impl FailureCause {
    pub fn new<C, M>(code: C, message: M) -> Self
    where
        C: Into<String>,
        M: Into<String>,
    {
        Self {
            code: code.into(),
            message: message.into(),
            resource_ids: Vec::new(),
        }
    }

    pub fn with_resource_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resource_ids = ids.into_iter().map(Into::into).collect();
        self
    }
}

impl Display for FailureCause {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}: {}",
            self.resource_ids.join(", "),
            self.code,
            self.message
        )
    }
}

/// Joins all causes, one per line.
pub fn join_failure_causes(causes: &[FailureCause]) -> Option<String> {
    if causes.is_empty() {
        return None;
    }
    Some(
        causes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

/// The result of an update call: either the updated object, or a handle to the asynchronous
/// operation that is performing the update.
#[derive(Clone, Debug)]
pub enum Updated<O, P> {
    Object(O),
    Operation(P),
}

/// A type with no values, used for associated types that a resource kind does not need.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Never {}

impl StatusSource for Never {
    fn status(&self) -> Option<&str> {
        match *self {}
    }
}

impl OperationHandle for Never {
    fn operation_id(&self) -> &str {
        match *self {}
    }
}

/// The backend boundary for one resource kind. Implementations own transport, encoding and
/// authentication; the engine only sees these calls.
///
/// `get` must return [`RemoteError::NotFound`] when the object does not exist.
#[async_trait::async_trait]
pub trait RemoteClient<K: ResourceKind>: Send + Sync {
    async fn create(&self, request: &K::Request) -> RemoteResult<K::Object>;

    async fn get(&self, id: &IdentityKey) -> RemoteResult<K::Object>;

    async fn update(
        &self,
        id: &IdentityKey,
        delta: &K::Delta,
    ) -> RemoteResult<Updated<K::Object, K::Operation>>;

    async fn delete(&self, id: &IdentityKey) -> RemoteResult<()>;

    async fn get_operation(
        &self,
        _id: &IdentityKey,
        _operation_id: &str,
    ) -> RemoteResult<K::Operation> {
        Err(RemoteError::unsupported("get_operation"))
    }

    /// Replace the object's definition in bulk. Returns the object as the import left it.
    async fn import_definition(
        &self,
        _id: &IdentityKey,
        _definition: &K::Definition,
    ) -> RemoteResult<K::Object> {
        Err(RemoteError::unsupported("import_definition"))
    }
}

/// Lets callers choose a backend at runtime, e.g. `Box<dyn RemoteClient<K>>`.
#[async_trait::async_trait]
impl<K, C> RemoteClient<K> for Box<C>
where
    K: ResourceKind,
    C: RemoteClient<K> + ?Sized,
{
    async fn create(&self, request: &K::Request) -> RemoteResult<K::Object> {
        (**self).create(request).await
    }

    async fn get(&self, id: &IdentityKey) -> RemoteResult<K::Object> {
        (**self).get(id).await
    }

    async fn update(
        &self,
        id: &IdentityKey,
        delta: &K::Delta,
    ) -> RemoteResult<Updated<K::Object, K::Operation>> {
        (**self).update(id, delta).await
    }

    async fn delete(&self, id: &IdentityKey) -> RemoteResult<()> {
        (**self).delete(id).await
    }

    async fn get_operation(
        &self,
        id: &IdentityKey,
        operation_id: &str,
    ) -> RemoteResult<K::Operation> {
        (**self).get_operation(id, operation_id).await
    }

    async fn import_definition(
        &self,
        id: &IdentityKey,
        definition: &K::Definition,
    ) -> RemoteResult<K::Object> {
        (**self).import_definition(id, definition).await
    }
}

/// Pure conversions between the declared spec and the backend's representation. No I/O.
pub trait StateMapper<K: ResourceKind>: Send + Sync {
    /// Derive the identity of a freshly created object.
    fn identity(&self, spec: &K::Spec, created: &K::Object) -> reconcile_model::Result<IdentityKey>;

    fn to_remote(&self, spec: &K::Spec) -> K::Request;

    fn from_remote(&self, object: &K::Object) -> K::Spec;

    /// The changed fields between `previous` and `desired`, or `None` if nothing changed.
    fn delta(&self, previous: &K::Spec, desired: &K::Spec) -> Option<K::Delta>;

    /// True if moving from `previous` to `desired` cannot be done in place.
    fn requires_replacement(&self, _previous: &K::Spec, _desired: &K::Spec) -> bool {
        false
    }

    /// The full definition to import in bulk, if the spec configures one.
    fn definition(&self, _spec: &K::Spec) -> Option<K::Definition> {
        None
    }

    /// True if moving from `previous` to `desired` requires a new bulk import.
    fn definition_changed(&self, previous: &K::Definition, desired: &K::Definition) -> bool {
        previous != desired
    }

    /// After a bulk import, the fields of `desired` that differ from what the import produced.
    fn reassert(&self, _desired: &K::Spec, _produced: &K::Object) -> Option<K::Delta> {
        None
    }

    /// Advice to attach to a failed update.
    fn update_failure_hint(&self, _desired: &K::Spec) -> Option<String> {
        None
    }
}
