//! The signed-in user's club memberships
//!
//! One [`MembershipList`] serves every membership tab; which actions it
//! offers is decided by its [`MembershipCapabilities`].

use async_trait::async_trait;
use clubs_rust_rest::{
    InstanceKey, KeyField, RequestBody, ResourceApi, ResourceClient, ResourceInstance, RestError,
};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::collection::CollectionSync;
use crate::error::Error;

/// The club side of a membership
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClubSummary {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// One membership of the signed-in user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub club: ClubSummary,
    #[serde(default)]
    pub role: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub public: bool,
}

/// Actions a membership list offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MembershipCapabilities {
    pub toggle_public: bool,
    pub toggle_active: bool,
    pub leave_club: bool,
}

impl MembershipCapabilities {
    pub fn all() -> Self {
        Self {
            toggle_public: true,
            toggle_active: true,
            leave_club: true,
        }
    }

    /// Read-only list
    pub fn none() -> Self {
        Self::default()
    }
}

/// Memberships read from `GET /memberships/` and written through
/// `clubs/<code>/members/<username>/`, keyed by club code
pub struct MembershipApi {
    memberships: ResourceClient,
    clubs: ResourceClient,
    username: InstanceKey,
    key_field: KeyField,
}

impl MembershipApi {
    fn member_client(&self, code: &InstanceKey) -> Result<ResourceClient, RestError> {
        Ok(self
            .clubs
            .nested(code, "members")?
            .with_key_field(KeyField::new("username")))
    }
}

#[async_trait]
impl ResourceApi for MembershipApi {
    fn key_field(&self) -> &KeyField {
        &self.key_field
    }

    async fn list(&self) -> Result<Vec<ResourceInstance>, RestError> {
        self.memberships.list().await
    }

    async fn create(&self, _body: RequestBody) -> Result<ResourceInstance, RestError> {
        Err(RestError::InvalidParameters(
            "memberships are created by joining a club".to_string(),
        ))
    }

    async fn update(
        &self,
        key: &InstanceKey,
        body: RequestBody,
    ) -> Result<ResourceInstance, RestError> {
        let mut updated = self
            .member_client(key)?
            .update(&self.username, body)
            .await?;
        // the member endpoint describes the club differently; keep the listed one
        updated.remove("club");
        Ok(updated)
    }

    async fn delete(&self, key: &InstanceKey) -> Result<(), RestError> {
        self.member_client(key)?.delete(&self.username).await
    }
}

/// One list for every membership tab
pub struct MembershipList {
    sync: CollectionSync<MembershipApi>,
    username: String,
    capabilities: MembershipCapabilities,
}

impl MembershipList {
    pub fn new(
        memberships: ResourceClient,
        clubs: ResourceClient,
        username: &str,
        capabilities: MembershipCapabilities,
    ) -> Self {
        let api = MembershipApi {
            memberships,
            clubs,
            username: InstanceKey::from(username),
            key_field: KeyField::new("club.code"),
        };
        Self {
            sync: CollectionSync::new(api),
            username: username.to_string(),
            capabilities,
        }
    }

    pub fn capabilities(&self) -> MembershipCapabilities {
        self.capabilities
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// The collection behind the list
    pub fn sync(&self) -> &CollectionSync<MembershipApi> {
        &self.sync
    }

    /// Cached memberships; entries that do not parse are skipped
    pub async fn memberships(&self) -> Vec<Membership> {
        self.sync
            .snapshot()
            .await
            .into_iter()
            .filter_map(|instance| membership(instance).ok())
            .collect()
    }

    pub async fn reload(&self) -> Result<Vec<Membership>, Error> {
        let count = self.sync.reload().await?;
        debug!("Loaded {} memberships", count);
        self.sync
            .snapshot()
            .await
            .into_iter()
            .map(membership)
            .collect()
    }

    async fn current(&self, code: &str) -> Result<Membership, Error> {
        let instance = self
            .sync
            .read()
            .await
            .get(&InstanceKey::from(code))
            .cloned()
            .ok_or_else(|| Error::general(format!("Not a member of {}", code)))?;
        membership(instance)
    }

    async fn patch(&self, code: &str, field: &str, value: bool) -> Result<Membership, Error> {
        let mut body = Map::new();
        body.insert(field.to_string(), Value::Bool(value));
        self.sync
            .update(&InstanceKey::from(code), RequestBody::Json(Value::Object(body)))
            .await?;

        let updated = self.current(code).await?;
        info!("Set {} on membership in {}", field, code);
        Ok(updated)
    }

    /// Show or hide the membership on the user's public profile
    pub async fn toggle_public(&self, code: &str) -> Result<Membership, Error> {
        if !self.capabilities.toggle_public {
            return Err(Error::CapabilityDisabled("toggle_public"));
        }
        let current = self.current(code).await?;
        self.patch(code, "public", !current.public).await
    }

    /// Mark the membership active or alumni
    pub async fn toggle_active(&self, code: &str) -> Result<Membership, Error> {
        if !self.capabilities.toggle_active {
            return Err(Error::CapabilityDisabled("toggle_active"));
        }
        let current = self.current(code).await?;
        self.patch(code, "active", !current.active).await
    }

    pub async fn leave_club(&self, code: &str) -> Result<(), Error> {
        if !self.capabilities.leave_club {
            return Err(Error::CapabilityDisabled("leave_club"));
        }
        self.sync.delete(&InstanceKey::from(code)).await?;
        info!("Left {}", code);
        Ok(())
    }
}

fn membership(instance: ResourceInstance) -> Result<Membership, Error> {
    Ok(serde_json::from_value(Value::from(instance))?)
}
