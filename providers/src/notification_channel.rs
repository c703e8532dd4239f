/*!

A DevOps Guru notification channel. The backend has no update call, so any change to the declared
channel replaces it. The channel has no status; a create is complete once the channel can be
listed.

!*/

use crate::timeouts;
use reconcile_model::{IdentityKey, IdentityShape, Timeouts};
use resource_agent::provider::{Never, RemoteClient, ResourceKind, StateMapper, StatusSource};
use resource_agent::{Configuration, Reconciler, ResourceConfig};
use serde::{Deserialize, Serialize};
use serde_plain::{derive_display_from_serialize, derive_fromstr_from_deserialize};
use std::collections::BTreeSet;

pub const NAME: &str = "devopsguru_notification_channel";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    ClosedInsight,
    NewAssociation,
    NewInsight,
    NewRecommendation,
    SeverityUpgraded,
}

derive_display_from_serialize!(MessageType);
derive_fromstr_from_deserialize!(MessageType);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

derive_display_from_serialize!(Severity);
derive_fromstr_from_deserialize!(Severity);

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnsChannel {
    pub topic_arn: String,
}

/// Restricts which notifications are sent. Empty sets send everything.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationFilters {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub message_types: BTreeSet<MessageType>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub severities: BTreeSet<Severity>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationChannelSpec {
    pub sns: SnsChannel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<NotificationFilters>,
}

impl Configuration for NotificationChannelSpec {}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub config: NotificationChannelSpec,
}

impl StatusSource for Channel {
    fn status(&self) -> Option<&str> {
        None
    }
}

pub struct NotificationChannel;

impl ResourceKind for NotificationChannel {
    const NAME: &'static str = NAME;
    type Spec = NotificationChannelSpec;
    type Request = NotificationChannelSpec;
    type Object = Channel;
    type Delta = Never;
    type Operation = Never;
    type Definition = Never;
}

pub struct ChannelMapper;

impl StateMapper<NotificationChannel> for ChannelMapper {
    fn identity(
        &self,
        _spec: &NotificationChannelSpec,
        created: &Channel,
    ) -> reconcile_model::Result<IdentityKey> {
        IdentityShape::SINGLE.build(&[created.id.as_str()])
    }

    fn to_remote(&self, spec: &NotificationChannelSpec) -> NotificationChannelSpec {
        spec.clone()
    }

    fn from_remote(&self, channel: &Channel) -> NotificationChannelSpec {
        channel.config.clone()
    }

    fn delta(&self, _: &NotificationChannelSpec, _: &NotificationChannelSpec) -> Option<Never> {
        None
    }

    fn requires_replacement(
        &self,
        previous: &NotificationChannelSpec,
        desired: &NotificationChannelSpec,
    ) -> bool {
        normalize(previous) != normalize(desired)
    }
}

/// An empty filter block and no filter block mean the same thing.
fn normalize(spec: &NotificationChannelSpec) -> NotificationChannelSpec {
    NotificationChannelSpec {
        sns: spec.sns.clone(),
        filters: spec
            .filters
            .clone()
            .filter(|filters| *filters != NotificationFilters::default()),
    }
}

pub fn config() -> crate::Result<ResourceConfig> {
    Ok(ResourceConfig::new(IdentityShape::SINGLE).timeouts(timeouts(NAME, Timeouts::default())?))
}

pub type ChannelReconciler<C> = Reconciler<NotificationChannel, C, ChannelMapper>;

pub fn reconciler<C: RemoteClient<NotificationChannel>>(
    client: C,
) -> crate::Result<ChannelReconciler<C>> {
    Ok(Reconciler::new(config()?, client, ChannelMapper))
}
