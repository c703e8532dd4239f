/*!

An add-on installed into an EKS cluster. The add-on is addressed by its cluster and add-on names,
updates run as separate asynchronous update operations, and a failed create leaves the add-on in
`CREATE_FAILED` with a list of health issues.

!*/

use crate::constants::MINUTE;
use crate::timeouts;
use reconcile_model::{IdentityKey, IdentityShape, StatusSets, Timeouts};
use resource_agent::provider::{
    FailureCause, OperationHandle, RemoteClient, ResourceKind, StateMapper, StatusSource,
};
use resource_agent::{Configuration, Reconciler, RemoteError, ResourceConfig, StatusWait};
use serde::{Deserialize, Serialize};
use serde_plain::{derive_display_from_serialize, derive_fromstr_from_deserialize};
use std::collections::{BTreeMap, BTreeSet};

pub const NAME: &str = "eks_addon";

pub const IDENTITY: IdentityShape = IdentityShape::composite(":", &["cluster_name", "addon_name"]);

pub const STATUS_CREATING: &str = "CREATING";
pub const STATUS_ACTIVE: &str = "ACTIVE";
pub const STATUS_CREATE_FAILED: &str = "CREATE_FAILED";
pub const STATUS_UPDATING: &str = "UPDATING";
pub const STATUS_DELETING: &str = "DELETING";
pub const STATUS_DELETE_FAILED: &str = "DELETE_FAILED";
pub const STATUS_DEGRADED: &str = "DEGRADED";

pub const UPDATE_IN_PROGRESS: &str = "InProgress";
pub const UPDATE_SUCCESSFUL: &str = "Successful";
pub const UPDATE_FAILED: &str = "Failed";
pub const UPDATE_CANCELLED: &str = "Cancelled";

/// How the backend handles fields the add-on's own configuration conflicts with.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolveConflicts {
    None,
    Overwrite,
    Preserve,
}

derive_display_from_serialize!(ResolveConflicts);
derive_fromstr_from_deserialize!(ResolveConflicts);

#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodIdentityAssociation {
    pub role_arn: String,
    pub service_account: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddonSpec {
    pub cluster_name: String,
    pub addon_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addon_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration_values: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub pod_identity_associations: BTreeSet<PodIdentityAssociation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolve_conflicts_on_create: Option<ResolveConflicts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolve_conflicts_on_update: Option<ResolveConflicts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_role_arn: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl Configuration for AddonSpec {}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAddonRequest {
    pub cluster_name: String,
    pub addon_name: String,
    pub addon_version: Option<String>,
    pub configuration_values: Option<String>,
    pub pod_identity_associations: Vec<PodIdentityAssociation>,
    pub resolve_conflicts: Option<ResolveConflicts>,
    pub service_account_role_arn: Option<String>,
    pub tags: BTreeMap<String, String>,
}

/// The fields of an update. `None` leaves a field as it is; an empty `pod_identity_associations`
/// list removes every association.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAddonRequest {
    pub addon_version: Option<String>,
    pub configuration_values: Option<String>,
    pub pod_identity_associations: Option<Vec<PodIdentityAssociation>>,
    pub resolve_conflicts: Option<ResolveConflicts>,
    pub service_account_role_arn: Option<String>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Addon {
    pub cluster_name: String,
    pub addon_name: String,
    pub addon_arn: Option<String>,
    pub addon_version: Option<String>,
    pub configuration_values: Option<String>,
    #[serde(default)]
    pub pod_identity_associations: Vec<PodIdentityAssociation>,
    pub service_account_role_arn: Option<String>,
    pub status: String,
    /// Health issues reported alongside a failure status.
    #[serde(default)]
    pub issues: Vec<FailureCause>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl StatusSource for Addon {
    fn status(&self) -> Option<&str> {
        Some(&self.status)
    }

    fn failure_causes(&self) -> Vec<FailureCause> {
        match self.status.as_str() {
            STATUS_CREATE_FAILED | STATUS_DELETE_FAILED => self.issues.clone(),
            _ => Vec::new(),
        }
    }
}

/// An asynchronous update of an add-on.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddonUpdate {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub errors: Vec<FailureCause>,
}

impl StatusSource for AddonUpdate {
    fn status(&self) -> Option<&str> {
        Some(&self.status)
    }

    fn failure_causes(&self) -> Vec<FailureCause> {
        match self.status.as_str() {
            UPDATE_FAILED | UPDATE_CANCELLED => self.errors.clone(),
            _ => Vec::new(),
        }
    }
}

impl OperationHandle for AddonUpdate {
    fn operation_id(&self) -> &str {
        &self.id
    }
}

pub struct EksAddon;

impl ResourceKind for EksAddon {
    const NAME: &'static str = NAME;
    type Spec = AddonSpec;
    type Request = CreateAddonRequest;
    type Object = Addon;
    type Delta = UpdateAddonRequest;
    type Operation = AddonUpdate;
    type Definition = resource_agent::provider::Never;
}

/// The parts of an add-on identity, for clients that need to address the add-on.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AddonKey {
    pub cluster_name: String,
    pub addon_name: String,
}

impl AddonKey {
    pub fn parse(id: &IdentityKey) -> reconcile_model::Result<Self> {
        let parts = IDENTITY.parse(id)?;
        Ok(Self {
            cluster_name: parts[0].to_string(),
            addon_name: parts[1].to_string(),
        })
    }
}

pub struct AddonMapper;

impl StateMapper<EksAddon> for AddonMapper {
    fn identity(&self, spec: &AddonSpec, _created: &Addon) -> reconcile_model::Result<IdentityKey> {
        IDENTITY.build(&[spec.cluster_name.as_str(), spec.addon_name.as_str()])
    }

    fn to_remote(&self, spec: &AddonSpec) -> CreateAddonRequest {
        CreateAddonRequest {
            cluster_name: spec.cluster_name.clone(),
            addon_name: spec.addon_name.clone(),
            addon_version: spec.addon_version.clone(),
            configuration_values: spec.configuration_values.clone(),
            pod_identity_associations: spec.pod_identity_associations.iter().cloned().collect(),
            resolve_conflicts: spec.resolve_conflicts_on_create,
            service_account_role_arn: spec.service_account_role_arn.clone(),
            tags: spec.tags.clone(),
        }
    }

    fn from_remote(&self, addon: &Addon) -> AddonSpec {
        AddonSpec {
            cluster_name: addon.cluster_name.clone(),
            addon_name: addon.addon_name.clone(),
            addon_version: addon.addon_version.clone(),
            configuration_values: addon.configuration_values.clone(),
            pod_identity_associations: addon.pod_identity_associations.iter().cloned().collect(),
            resolve_conflicts_on_create: None,
            resolve_conflicts_on_update: None,
            service_account_role_arn: addon.service_account_role_arn.clone(),
            tags: addon.tags.clone(),
        }
    }

    fn delta(&self, previous: &AddonSpec, desired: &AddonSpec) -> Option<UpdateAddonRequest> {
        let version_changed = previous.addon_version != desired.addon_version;
        let values_changed = previous.configuration_values != desired.configuration_values;
        let associations_changed =
            previous.pod_identity_associations != desired.pod_identity_associations;
        let role_changed = previous.service_account_role_arn != desired.service_account_role_arn;
        if !(version_changed || values_changed || associations_changed || role_changed) {
            return None;
        }

        Some(UpdateAddonRequest {
            addon_version: desired.addon_version.clone().filter(|_| version_changed),
            configuration_values: if values_changed {
                Some(desired.configuration_values.clone().unwrap_or_default())
            } else {
                None
            },
            pod_identity_associations: if associations_changed {
                Some(desired.pod_identity_associations.iter().cloned().collect())
            } else {
                None
            },
            resolve_conflicts: desired.resolve_conflicts_on_update,
            // The role is resent with every update; the backend otherwise drops it.
            service_account_role_arn: if role_changed || desired.service_account_role_arn.is_some()
            {
                Some(desired.service_account_role_arn.clone().unwrap_or_default())
            } else {
                None
            },
        })
    }

    fn requires_replacement(&self, previous: &AddonSpec, desired: &AddonSpec) -> bool {
        previous.cluster_name != desired.cluster_name || previous.addon_name != desired.addon_name
    }

    fn update_failure_hint(&self, desired: &AddonSpec) -> Option<String> {
        if desired.resolve_conflicts_on_update == Some(ResolveConflicts::Overwrite) {
            None
        } else {
            Some(format!(
                "Consider setting resolve_conflicts_on_update to {}",
                ResolveConflicts::Overwrite
            ))
        }
    }
}

/// Creation can race with the cluster or a previous failed add-on.
pub fn is_retryable_create(error: &RemoteError) -> bool {
    error.is_api_error("InvalidParameterException", "CREATE_FAILED")
        || error.is_api_error("InvalidParameterException", "does not exist")
}

pub fn config() -> crate::Result<ResourceConfig> {
    Ok(ResourceConfig::new(IDENTITY)
        .timeouts(timeouts(
            NAME,
            Timeouts::new(20 * MINUTE, 20 * MINUTE, 40 * MINUTE),
        )?)
        .create_wait(StatusWait::new(
            StatusSets::new([STATUS_CREATING, STATUS_DEGRADED], [STATUS_ACTIVE])
                .with_failure([STATUS_CREATE_FAILED]),
        ))
        .operation_wait(StatusWait::new(
            StatusSets::new([UPDATE_IN_PROGRESS], [UPDATE_SUCCESSFUL])
                .with_failure([UPDATE_FAILED, UPDATE_CANCELLED]),
        ))
        .delete_wait(StatusWait::new(
            StatusSets::absence([STATUS_ACTIVE, STATUS_DELETING])
                .with_failure([STATUS_DELETE_FAILED]),
        ))
        .retry_create(is_retryable_create)
        .create_failure_hint(
            "Reconciling again will remove the add-on and create it again, purging its \
             previous configuration",
        ))
}

pub type AddonReconciler<C> = Reconciler<EksAddon, C, AddonMapper>;

pub fn reconciler<C: RemoteClient<EksAddon>>(client: C) -> crate::Result<AddonReconciler<C>> {
    Ok(Reconciler::new(config()?, client, AddonMapper))
}

#[cfg(test)]
mod test {
    use super::*;
    use maplit::btreeset;

    fn spec() -> AddonSpec {
        AddonSpec {
            cluster_name: "prod".to_string(),
            addon_name: "vpc-cni".to_string(),
            addon_version: Some("v1.18.0-eksbuild.1".to_string()),
            service_account_role_arn: Some("arn:aws:iam::123456789012:role/cni".to_string()),
            ..AddonSpec::default()
        }
    }

    #[test]
    fn identity_round_trip() {
        let id = AddonMapper.identity(&spec(), &Addon::default()).unwrap();
        assert_eq!(id.as_str(), "prod:vpc-cni");
        assert_eq!(
            AddonKey::parse(&id).unwrap(),
            AddonKey {
                cluster_name: "prod".to_string(),
                addon_name: "vpc-cni".to_string()
            }
        );
        let error = AddonKey::parse(&IdentityKey::new("vpc-cni")).unwrap_err();
        assert!(error.to_string().contains("CLUSTER-NAME:ADDON-NAME"));
    }

    #[test]
    fn unchanged_spec_has_no_delta() {
        let mut desired = spec();
        desired.tags.insert("team".to_string(), "net".to_string());
        assert!(AddonMapper.delta(&spec(), &desired).is_none());
    }

    #[test]
    fn version_change_resends_role() {
        let mut desired = spec();
        desired.addon_version = Some("v1.19.0-eksbuild.1".to_string());
        let delta = AddonMapper.delta(&spec(), &desired).unwrap();
        assert_eq!(delta.addon_version.as_deref(), Some("v1.19.0-eksbuild.1"));
        assert!(delta.configuration_values.is_none());
        assert!(delta.pod_identity_associations.is_none());
        assert_eq!(
            delta.service_account_role_arn,
            desired.service_account_role_arn
        );
    }

    #[test]
    fn removed_associations_are_cleared() {
        let mut previous = spec();
        previous.pod_identity_associations = btreeset! {PodIdentityAssociation {
            role_arn: "arn:aws:iam::123456789012:role/pod".to_string(),
            service_account: "aws-node".to_string(),
        }};
        let delta = AddonMapper.delta(&previous, &spec()).unwrap();
        assert_eq!(delta.pod_identity_associations, Some(Vec::new()));
        assert!(delta.addon_version.is_none());
    }

    #[test]
    fn removed_role_is_sent_empty() {
        let mut desired = spec();
        desired.service_account_role_arn = None;
        let delta = AddonMapper.delta(&spec(), &desired).unwrap();
        assert_eq!(delta.service_account_role_arn.as_deref(), Some(""));
    }

    #[test]
    fn names_force_replacement() {
        let mut desired = spec();
        assert!(!AddonMapper.requires_replacement(&spec(), &desired));
        desired.cluster_name = "staging".to_string();
        assert!(AddonMapper.requires_replacement(&spec(), &desired));
    }

    #[test]
    fn hint_unless_overwriting() {
        let mut desired = spec();
        assert_eq!(
            AddonMapper.update_failure_hint(&desired).unwrap(),
            "Consider setting resolve_conflicts_on_update to OVERWRITE"
        );
        desired.resolve_conflicts_on_update = Some(ResolveConflicts::Overwrite);
        assert!(AddonMapper.update_failure_hint(&desired).is_none());
    }

    #[test]
    fn retryable_create_errors() {
        assert!(is_retryable_create(&RemoteError::api(
            "InvalidParameterException",
            "Addon vpc-cni is in CREATE_FAILED state"
        )));
        assert!(is_retryable_create(&RemoteError::api(
            "InvalidParameterException",
            "The role arn:aws:iam::123456789012:role/cni does not exist"
        )));
        assert!(!is_retryable_create(&RemoteError::api(
            "InvalidParameterException",
            "Addon version is not supported"
        )));
        assert!(!is_retryable_create(&RemoteError::api(
            "ResourceInUseException",
            "does not exist"
        )));
    }

    #[test]
    fn issues_only_reported_for_failures() {
        let mut addon = Addon {
            status: STATUS_DEGRADED.to_string(),
            issues: vec![FailureCause::new("InsufficientNumberOfReplicas", "0/2 ready")],
            ..Addon::default()
        };
        assert!(addon.failure_causes().is_empty());
        addon.status = STATUS_CREATE_FAILED.to_string();
        assert_eq!(addon.failure_causes().len(), 1);
    }

    #[test]
    fn spec_from_json() {
        let spec = AddonSpec::from_value(serde_json::json!({
            "clusterName": "prod",
            "addonName": "coredns",
            "resolveConflictsOnUpdate": "OVERWRITE",
        }))
        .unwrap();
        assert_eq!(
            spec.resolve_conflicts_on_update,
            Some(ResolveConflicts::Overwrite)
        );
        assert!(spec.pod_identity_associations.is_empty());
    }
}
