/*!

This test module provides a mock implementation of the [`RemoteClient`] for a made-up `widget`
resource so that the [`Reconciler`] can be tested without a backend. The mock keeps its objects
in memory and can be scripted to return a sequence of statuses, transient errors and
asynchronous update operations.

!*/

use reconcile_model::{Backoff, IdentityShape, PollSettings, RetrySettings, StatusSets, Timeouts};
use resource_agent::diff::SetDelta;
use resource_agent::provider::{
    FailureCause, OperationHandle, RemoteClient, ResourceKind, StateMapper, StatusSource, Updated,
};
use resource_agent::{
    Configuration, IdentityKey, Reconciler, RemoteError, RemoteResult, ResourceConfig, StatusWait,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) const CREATING: &str = "CREATING";
pub(crate) const ACTIVE: &str = "ACTIVE";
pub(crate) const CREATE_FAILED: &str = "CREATE_FAILED";
pub(crate) const DELETING: &str = "DELETING";
pub(crate) const IN_PROGRESS: &str = "InProgress";
pub(crate) const SUCCESSFUL: &str = "Successful";
pub(crate) const FAILED: &str = "Failed";

pub(crate) struct Widget;

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WidgetSpec {
    pub(crate) name: String,
    pub(crate) size: u32,
    #[serde(default)]
    pub(crate) tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) definition: Option<String>,
}

impl Configuration for WidgetSpec {}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WidgetObject {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) size: u32,
    pub(crate) tags: BTreeSet<String>,
    pub(crate) definition: Option<String>,
    pub(crate) status: String,
    pub(crate) issues: Vec<FailureCause>,
}

impl StatusSource for WidgetObject {
    fn status(&self) -> Option<&str> {
        Some(&self.status)
    }

    fn failure_causes(&self) -> Vec<FailureCause> {
        self.issues.clone()
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub(crate) struct WidgetDelta {
    pub(crate) size: Option<u32>,
    pub(crate) tags: SetDelta<String>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct WidgetOperation {
    pub(crate) id: String,
    pub(crate) status: String,
    pub(crate) errors: Vec<FailureCause>,
}

impl StatusSource for WidgetOperation {
    fn status(&self) -> Option<&str> {
        Some(&self.status)
    }

    fn failure_causes(&self) -> Vec<FailureCause> {
        self.errors.clone()
    }
}

impl OperationHandle for WidgetOperation {
    fn operation_id(&self) -> &str {
        &self.id
    }
}

impl ResourceKind for Widget {
    const NAME: &'static str = "widget";
    type Spec = WidgetSpec;
    type Request = WidgetSpec;
    type Object = WidgetObject;
    type Delta = WidgetDelta;
    type Operation = WidgetOperation;
    type Definition = String;
}

/// Everything the mock backend knows, shared with the test so it can script and inspect.
#[derive(Debug, Default)]
pub(crate) struct Backend {
    pub(crate) objects: HashMap<String, WidgetObject>,
    next_id: u32,
    /// The status a new object starts in.
    pub(crate) initial_status: String,
    /// Statuses applied on successive `get` calls. `None` answers not-found.
    pub(crate) get_script: VecDeque<Option<&'static str>>,
    /// Issues attached to an object when a script moves it to `CREATE_FAILED`.
    pub(crate) create_issues: Vec<FailureCause>,
    pub(crate) create_errors: VecDeque<RemoteError>,
    pub(crate) delete_errors: VecDeque<RemoteError>,
    /// Assign an empty id on create.
    pub(crate) blank_ids: bool,
    /// Number of `get` calls for which a deleted object still reports `DELETING`.
    pub(crate) delete_lag: u32,
    deleting: HashMap<String, u32>,
    /// Run updates as asynchronous operations with these statuses.
    pub(crate) operation_script: Option<VecDeque<&'static str>>,
    pub(crate) operation_errors: Vec<FailureCause>,
    pub(crate) create_calls: u32,
    pub(crate) get_calls: u32,
    pub(crate) delete_calls: u32,
    pub(crate) get_operation_calls: u32,
    pub(crate) updates: Vec<WidgetDelta>,
    pub(crate) imports: Vec<String>,
}

impl Backend {
    /// Put an object in place as if an earlier reconciliation had created it.
    pub(crate) fn insert(&mut self, id: &str, spec: &WidgetSpec, status: &str) {
        self.objects.insert(
            id.to_string(),
            WidgetObject {
                id: id.to_string(),
                name: spec.name.clone(),
                size: spec.size,
                tags: spec.tags.clone(),
                definition: spec.definition.clone(),
                status: status.to_string(),
                issues: Vec::new(),
            },
        );
    }
}

#[derive(Clone, Default)]
pub(crate) struct MockClient {
    pub(crate) backend: Arc<Mutex<Backend>>,
}

impl MockClient {
    pub(crate) fn new() -> Self {
        let client = Self::default();
        client.backend().initial_status = ACTIVE.to_string();
        client
    }

    pub(crate) fn backend(&self) -> std::sync::MutexGuard<'_, Backend> {
        self.backend.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl RemoteClient<Widget> for MockClient {
    async fn create(&self, request: &WidgetSpec) -> RemoteResult<WidgetObject> {
        let mut backend = self.backend();
        backend.create_calls += 1;
        if let Some(error) = backend.create_errors.pop_front() {
            return Err(error);
        }
        backend.next_id += 1;
        let id = if backend.blank_ids {
            String::new()
        } else {
            format!("w-{}", backend.next_id)
        };
        let status = backend.initial_status.clone();
        backend.insert(&id, request, &status);
        Ok(backend.objects[&id].clone())
    }

    async fn get(&self, id: &IdentityKey) -> RemoteResult<WidgetObject> {
        let mut backend = self.backend();
        backend.get_calls += 1;

        if let Some(remaining) = backend.deleting.get(id.as_str()).copied() {
            if remaining == 0 {
                backend.deleting.remove(id.as_str());
                backend.objects.remove(id.as_str());
            } else {
                backend.deleting.insert(id.to_string(), remaining - 1);
            }
        }

        let scripted = backend.get_script.pop_front();
        let issues = backend.create_issues.clone();
        let object = match backend.objects.get_mut(id.as_str()) {
            Some(object) => object,
            None => return Err(RemoteError::not_found(id.as_str())),
        };
        match scripted {
            Some(None) => Err(RemoteError::not_found(id.as_str())),
            Some(Some(status)) => {
                object.status = status.to_string();
                if status == CREATE_FAILED {
                    object.issues = issues;
                }
                Ok(object.clone())
            }
            None => Ok(object.clone()),
        }
    }

    async fn update(
        &self,
        id: &IdentityKey,
        delta: &WidgetDelta,
    ) -> RemoteResult<Updated<WidgetObject, WidgetOperation>> {
        let mut backend = self.backend();
        backend.updates.push(delta.clone());
        let asynchronous = backend.operation_script.is_some();
        let object = backend
            .objects
            .get_mut(id.as_str())
            .ok_or_else(|| RemoteError::not_found(id.as_str()))?;
        if let Some(size) = delta.size {
            object.size = size;
        }
        for tag in &delta.tags.removed {
            object.tags.remove(tag);
        }
        for tag in &delta.tags.added {
            object.tags.insert(tag.clone());
        }
        let object = object.clone();
        if asynchronous {
            Ok(Updated::Operation(WidgetOperation {
                id: format!("op-{}", backend.updates.len()),
                status: IN_PROGRESS.to_string(),
                errors: Vec::new(),
            }))
        } else {
            Ok(Updated::Object(object))
        }
    }

    async fn delete(&self, id: &IdentityKey) -> RemoteResult<()> {
        let mut backend = self.backend();
        backend.delete_calls += 1;
        if let Some(error) = backend.delete_errors.pop_front() {
            return Err(error);
        }
        if backend.deleting.contains_key(id.as_str()) {
            return Ok(());
        }
        let lag = backend.delete_lag;
        let object = backend
            .objects
            .get_mut(id.as_str())
            .ok_or_else(|| RemoteError::not_found(id.as_str()))?;
        if lag > 0 {
            object.status = DELETING.to_string();
            backend.deleting.insert(id.to_string(), lag);
        } else {
            backend.objects.remove(id.as_str());
        }
        Ok(())
    }

    async fn get_operation(
        &self,
        _id: &IdentityKey,
        operation_id: &str,
    ) -> RemoteResult<WidgetOperation> {
        let mut backend = self.backend();
        backend.get_operation_calls += 1;
        let errors = backend.operation_errors.clone();
        let status = backend
            .operation_script
            .as_mut()
            .and_then(|script| {
                if script.len() > 1 {
                    script.pop_front()
                } else {
                    script.front().copied()
                }
            })
            .ok_or_else(|| RemoteError::not_found(operation_id))?;
        Ok(WidgetOperation {
            id: operation_id.to_string(),
            status: status.to_string(),
            errors: if status == FAILED { errors } else { Vec::new() },
        })
    }

    async fn import_definition(
        &self,
        id: &IdentityKey,
        definition: &String,
    ) -> RemoteResult<WidgetObject> {
        let mut backend = self.backend();
        backend.imports.push(definition.clone());
        let object = backend
            .objects
            .get_mut(id.as_str())
            .ok_or_else(|| RemoteError::not_found(id.as_str()))?;
        // An import resets everything it does not describe.
        object.definition = Some(definition.clone());
        object.size = 0;
        Ok(object.clone())
    }
}

pub(crate) struct WidgetMapper;

impl StateMapper<Widget> for WidgetMapper {
    fn identity(
        &self,
        _spec: &WidgetSpec,
        created: &WidgetObject,
    ) -> reconcile_model::Result<IdentityKey> {
        IdentityShape::SINGLE.build(&[created.id.as_str()])
    }

    fn to_remote(&self, spec: &WidgetSpec) -> WidgetSpec {
        WidgetSpec {
            definition: None,
            ..spec.clone()
        }
    }

    fn from_remote(&self, object: &WidgetObject) -> WidgetSpec {
        WidgetSpec {
            name: object.name.clone(),
            size: object.size,
            tags: object.tags.clone(),
            definition: object.definition.clone(),
        }
    }

    fn delta(&self, previous: &WidgetSpec, desired: &WidgetSpec) -> Option<WidgetDelta> {
        let delta = WidgetDelta {
            size: Some(desired.size).filter(|size| *size != previous.size),
            tags: SetDelta::between(&previous.tags, &desired.tags),
        };
        if delta.size.is_none() && delta.tags.is_empty() {
            None
        } else {
            Some(delta)
        }
    }

    fn requires_replacement(&self, previous: &WidgetSpec, desired: &WidgetSpec) -> bool {
        previous.name != desired.name
    }

    fn definition(&self, spec: &WidgetSpec) -> Option<String> {
        spec.definition.clone()
    }

    fn reassert(&self, desired: &WidgetSpec, produced: &WidgetObject) -> Option<WidgetDelta> {
        self.delta(&self.from_remote(produced), desired).map(|delta| WidgetDelta {
            tags: SetDelta::default(),
            ..delta
        })
    }

    fn update_failure_hint(&self, _desired: &WidgetSpec) -> Option<String> {
        Some("Try again with force = true".to_string())
    }
}

fn retry_conflicts(error: &RemoteError) -> bool {
    error.code() == Some("ConflictException")
}

pub(crate) fn widget_config() -> ResourceConfig {
    ResourceConfig::new(IdentityShape::SINGLE)
        .timeouts(Timeouts::uniform(Duration::from_secs(60)))
        .poll(PollSettings::new(
            Duration::ZERO,
            Backoff::fixed(Duration::from_secs(1)),
        ))
        .retry(RetrySettings::new(
            Duration::from_secs(30),
            Backoff::fixed(Duration::from_secs(1)),
        ))
        .create_wait(
            StatusWait::new(StatusSets::new([CREATING], [ACTIVE]).with_failure([CREATE_FAILED]))
                .with_not_found_checks(3),
        )
        .operation_wait(StatusWait::new(
            StatusSets::new([IN_PROGRESS], [SUCCESSFUL]).with_failure([FAILED]),
        ))
        .delete_wait(StatusWait::new(StatusSets::absence([ACTIVE, DELETING])))
        .retry_create(retry_conflicts)
        .retry_update(retry_conflicts)
        .create_failure_hint("The widget will be replaced on the next reconciliation.")
}

pub(crate) type WidgetReconciler = Reconciler<Widget, MockClient, WidgetMapper>;

pub(crate) fn reconciler(client: &MockClient) -> WidgetReconciler {
    Reconciler::new(widget_config(), client.clone(), WidgetMapper)
}

pub(crate) fn spec(name: &str, size: u32, tags: &[&str]) -> WidgetSpec {
    WidgetSpec {
        name: name.to_string(),
        size,
        tags: tags.iter().map(|tag| tag.to_string()).collect(),
        definition: None,
    }
}
