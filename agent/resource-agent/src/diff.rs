//! Helpers for computing minimal update deltas.
//!
//! Backends that accept JSON-patch style updates take a list of [`PatchOperation`]s. Collections
//! the backend stores as a bag of independently addressable elements can be updated in two ways:
//!
//! - [`PatchBuilder::clear_and_reinstate`] removes every old element and adds every new one. Use
//!   it when the backend has no positional replace and re-adding an element has no side effects.
//! - [`PatchBuilder::set_difference`] only touches elements that actually changed. Use it when
//!   removing and immediately re-adding an element could race with backend propagation (network
//!   endpoint associations, DNS).

use serde::{Deserialize, Serialize};
use serde_plain::{derive_display_from_serialize, derive_fromstr_from_deserialize};
use std::collections::BTreeSet;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Remove,
    Replace,
}

derive_display_from_serialize!(PatchOp);
derive_fromstr_from_deserialize!(PatchOp);

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl PatchOperation {
    pub fn add<P: Into<String>, V: Into<String>>(path: P, value: V) -> Self {
        Self {
            op: PatchOp::Add,
            path: path.into(),
            value: Some(value.into()),
        }
    }

    pub fn remove<P: Into<String>>(path: P) -> Self {
        Self {
            op: PatchOp::Remove,
            path: path.into(),
            value: None,
        }
    }

    pub fn replace<P: Into<String>, V: Into<String>>(path: P, value: V) -> Self {
        Self {
            op: PatchOp::Replace,
            path: path.into(),
            value: Some(value.into()),
        }
    }
}

/// Escape a value for use as one segment of a JSON pointer (RFC 6901).
pub fn escape_json_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// The elements added to and removed from a set-valued field. `added` and `removed` are always
/// disjoint.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SetDelta<T: Ord> {
    pub added: BTreeSet<T>,
    pub removed: BTreeSet<T>,
}

impl<T: Ord> Default for SetDelta<T> {
    fn default() -> Self {
        Self {
            added: BTreeSet::new(),
            removed: BTreeSet::new(),
        }
    }
}

impl<T: Ord + Clone> SetDelta<T> {
    /// `added = new - old`, `removed = old - new`.
    pub fn between<'a, O, N>(old: O, new: N) -> Self
    where
        T: 'a,
        O: IntoIterator<Item = &'a T>,
        N: IntoIterator<Item = &'a T>,
    {
        let old: BTreeSet<&T> = old.into_iter().collect();
        let new: BTreeSet<&T> = new.into_iter().collect();
        Self {
            added: new.difference(&old).map(|v| (*v).clone()).collect(),
            removed: old.difference(&new).map(|v| (*v).clone()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Accumulates patch operations in the order they are added.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PatchBuilder {
    operations: Vec<PatchOperation>,
}

impl PatchBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, operation: PatchOperation) -> &mut Self {
        self.operations.push(operation);
        self
    }

    /// Replace `path` with `new` if it differs from `old`.
    pub fn replace_if_changed(&mut self, path: &str, old: &str, new: &str) -> &mut Self {
        if old != new {
            self.operations.push(PatchOperation::replace(path, new));
        }
        self
    }

    /// Remove then add the elements that changed between `old` and `new`, each addressed by the
    /// collection path with the element as the value.
    pub fn set_difference(
        &mut self,
        path: &str,
        old: &BTreeSet<String>,
        new: &BTreeSet<String>,
    ) -> &mut Self {
        let delta = SetDelta::between(old, new);
        for removed in delta.removed {
            self.operations.push(PatchOperation {
                op: PatchOp::Remove,
                path: path.to_string(),
                value: Some(removed),
            });
        }
        for added in delta.added {
            self.operations.push(PatchOperation::add(path, added));
        }
        self
    }

    /// If the collection changed at all, remove every old element and add every new one, each
    /// addressed by its escaped value under `prefix`.
    pub fn clear_and_reinstate(&mut self, prefix: &str, old: &[String], new: &[String]) -> &mut Self {
        if old == new {
            return self;
        }
        for value in old {
            self.operations.push(PatchOperation::remove(format!(
                "{}/{}",
                prefix,
                escape_json_pointer(value)
            )));
        }
        for value in new {
            self.operations.push(PatchOperation {
                op: PatchOp::Add,
                path: format!("{}/{}", prefix, escape_json_pointer(value)),
                value: None,
            });
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn build(self) -> Vec<PatchOperation> {
        self.operations
    }

    /// The operations, or `None` if there are none.
    pub fn build_non_empty(self) -> Option<Vec<PatchOperation>> {
        if self.operations.is_empty() {
            None
        } else {
            Some(self.operations)
        }
    }
}
