use serde::{Deserialize, Serialize};
use serde_plain::{derive_display_from_serialize, derive_fromstr_from_deserialize};

/// The lifecycle of one managed object as seen by a single reconciliation attempt.
///
/// `Absent → Creating → Active → {Updating → Active}* → Deleting → Absent`, with `CreateFailed`,
/// `UpdateFailed` and `DeleteFailed` absorbing the attempt that reached them.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LifecycleState {
    #[default]
    Absent,
    Creating,
    Active,
    Updating,
    Deleting,
    CreateFailed,
    UpdateFailed,
    DeleteFailed,
}

derive_display_from_serialize!(LifecycleState);
derive_fromstr_from_deserialize!(LifecycleState);

impl LifecycleState {
    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            LifecycleState::CreateFailed
                | LifecycleState::UpdateFailed
                | LifecycleState::DeleteFailed
        )
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            LifecycleState::Creating | LifecycleState::Updating | LifecycleState::Deleting
        )
    }

    /// The failure state an in-progress state falls into, if any.
    pub fn failed(&self) -> Option<LifecycleState> {
        match self {
            LifecycleState::Creating => Some(LifecycleState::CreateFailed),
            LifecycleState::Updating => Some(LifecycleState::UpdateFailed),
            LifecycleState::Deleting => Some(LifecycleState::DeleteFailed),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Absent, Creating)
                | (Creating, Active)
                | (Creating, CreateFailed)
                | (Active, Updating)
                | (Updating, Active)
                | (Updating, UpdateFailed)
                | (Active, Deleting)
                | (Deleting, Absent)
                | (Deleting, DeleteFailed)
        )
    }
}
