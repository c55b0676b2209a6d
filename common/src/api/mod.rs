// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Portable views of provider resources
//!
//! These are the types callers see regardless of which provider backs
//! them.  A translator builds each value once from a provider-native
//! resource plus a resolved location; nothing here is mutated after
//! construction.  A changed view is a newly built object.

mod error;
pub use error::*;

use crate::identity::ScopedId;
use chrono::DateTime;
use chrono::Utc;
use parse_display::Display;
use parse_display::FromStr;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

/// How widely a [`Location`] applies.
///
/// Scopes strictly widen going up a location's parent chain:
/// `Host` ⊂ `Zone` ⊂ `Region` ⊂ `Provider`.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Display,
    Eq,
    FromStr,
    JsonSchema,
    PartialEq,
    Serialize,
)]
#[display(style = "UPPERCASE")]
#[serde(rename_all = "lowercase")]
pub enum LocationScope {
    Provider,
    Region,
    Zone,
    Host,
}

impl LocationScope {
    fn width(&self) -> u8 {
        match self {
            LocationScope::Provider => 3,
            LocationScope::Region => 2,
            LocationScope::Zone => 1,
            LocationScope::Host => 0,
        }
    }
}

/// A node in the location tree
///
/// Locations are resolved once per provider context and shared
/// read-only across all translators, so parents are held by `Arc`.
#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
pub struct Location {
    pub scope: LocationScope,
    pub id: String,
    pub description: String,
    pub parent: Option<Arc<Location>>,
}

impl Location {
    /// Builds a location, enforcing that the parent chain strictly
    /// widens (a zone's parent must be a region or the provider, never
    /// another zone or a host).
    pub fn new(
        scope: LocationScope,
        id: &str,
        description: &str,
        parent: Option<Arc<Location>>,
    ) -> Result<Location, Error> {
        if let Some(parent) = &parent {
            if parent.scope.width() <= scope.width() {
                return Err(Error::invalid_value(
                    "parent",
                    &format!(
                        "parent scope {} does not widen child scope {}",
                        parent.scope, scope
                    ),
                ));
            }
        }
        Ok(Location {
            scope,
            id: id.to_owned(),
            description: description.to_owned(),
            parent,
        })
    }

    /// Walks up the parent chain to the nearest location with the given
    /// scope, including this one.
    pub fn find_in_chain(&self, scope: LocationScope) -> Option<&Location> {
        let mut current = self;
        loop {
            if current.scope == scope {
                return Some(current);
            }
            match &current.parent {
                Some(parent) => current = parent,
                None => return None,
            }
        }
    }
}

/// Portable running state of a node
///
/// Provider-native states map onto this enum; native states this
/// library has never heard of map to `Unrecognized` rather than failing,
/// since a provider adding a state must not break existing clients.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Display,
    Eq,
    JsonSchema,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[display(style = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Pending,
    Running,
    Suspended,
    Terminated,
    Error,
    Unrecognized,
}

impl NodeState {
    /// Maps a provider-native state label onto the portable state.
    ///
    /// The labels here are the union of the states the supported
    /// providers report for servers; matching is case-insensitive.
    pub fn from_native_label(label: &str) -> NodeState {
        match label.to_ascii_lowercase().as_str() {
            "pending" | "creating" | "starting" | "build" | "building"
            | "provisioning" | "rebuild" | "reboot" | "hard_reboot" => {
                NodeState::Pending
            }
            "running" | "active" => NodeState::Running,
            "stopped" | "stopping" | "suspended" | "paused" | "shutoff" => {
                NodeState::Suspended
            }
            "terminated" | "shutting-down" | "deleted" => {
                NodeState::Terminated
            }
            "error" => NodeState::Error,
            _ => NodeState::Unrecognized,
        }
    }
}

/// Portable state of a machine image
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Display,
    Eq,
    JsonSchema,
    PartialEq,
    Serialize,
)]
#[display(style = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ImageState {
    Pending,
    Available,
    Error,
    Unrecognized,
}

impl ImageState {
    pub fn from_native_label(label: &str) -> ImageState {
        match label.to_ascii_lowercase().as_str() {
            "pending" | "queued" | "saving" | "untarring" => {
                ImageState::Pending
            }
            "available" | "active" => ImageState::Available,
            "failed" | "error" | "killed" => ImageState::Error,
            _ => ImageState::Unrecognized,
        }
    }
}

/// Login credentials for a node
///
/// For nodes launched with a generated key pair, `credential` holds the
/// PEM-encoded private key; otherwise whatever secret the provider
/// reported at creation.
#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
pub struct Credentials {
    pub identity: String,
    pub credential: String,
}

/// Portable view of a compute node
#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
pub struct NodeMetadata {
    /// Encoded compound identity (`scope/native_id`)
    pub id: ScopedId,
    /// The raw provider-native id
    pub provider_id: String,
    pub name: String,
    /// The node group this node was launched into, if the library
    /// launched it
    pub group: Option<String>,
    pub location: Arc<Location>,
    pub state: NodeState,
    /// Deduplicated; addresses the provider reported inline come before
    /// floating IPs discovered through the derived-data cache
    pub public_addresses: Vec<String>,
    pub private_addresses: Vec<String>,
    pub user_metadata: BTreeMap<String, String>,
    pub credentials: Option<Credentials>,
}

impl NodeMetadata {
    pub fn builder(
        id: ScopedId,
        provider_id: &str,
        location: Arc<Location>,
        state: NodeState,
    ) -> NodeMetadataBuilder {
        NodeMetadataBuilder {
            node: NodeMetadata {
                id,
                provider_id: provider_id.to_owned(),
                name: provider_id.to_owned(),
                group: None,
                location,
                state,
                public_addresses: Vec::new(),
                private_addresses: Vec::new(),
                user_metadata: BTreeMap::new(),
                credentials: None,
            },
        }
    }

    /// Starts a builder seeded with this node's fields, for the
    /// post-creation paths that rewrite a node's name or metadata.
    pub fn rebuild(&self) -> NodeMetadataBuilder {
        NodeMetadataBuilder { node: self.clone() }
    }
}

/// Builder for [`NodeMetadata`]; the only way to make one.
#[derive(Clone, Debug)]
pub struct NodeMetadataBuilder {
    node: NodeMetadata,
}

impl NodeMetadataBuilder {
    pub fn name(mut self, name: &str) -> Self {
        self.node.name = name.to_owned();
        self
    }

    pub fn group(mut self, group: &str) -> Self {
        self.node.group = Some(group.to_owned());
        self
    }

    pub fn public_addresses(mut self, addresses: Vec<String>) -> Self {
        self.node.public_addresses = addresses;
        self
    }

    pub fn private_addresses(mut self, addresses: Vec<String>) -> Self {
        self.node.private_addresses = addresses;
        self
    }

    pub fn user_metadata(
        mut self,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        self.node.user_metadata = metadata;
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.node.credentials = Some(credentials);
        self
    }

    pub fn build(self) -> NodeMetadata {
        self.node
    }
}

/// Portable view of a machine image
#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
pub struct Image {
    pub id: ScopedId,
    pub provider_id: String,
    pub name: String,
    pub location: Arc<Location>,
    pub state: ImageState,
    /// When the provider registered the image; not every provider
    /// reports this
    pub created: Option<DateTime<Utc>>,
    pub user_metadata: BTreeMap<String, String>,
}

/// Portable view of a hardware profile (instance type / flavor)
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
pub struct Hardware {
    pub id: ScopedId,
    pub provider_id: String,
    pub name: String,
    pub location: Arc<Location>,
    pub vcpus: u32,
    pub memory_mib: u64,
    pub volume_gib: u64,
}

/// IP protocols expressible in an ingress rule
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Display,
    Eq,
    FromStr,
    JsonSchema,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[display(style = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum IpProtocol {
    Tcp,
    Udp,
    Icmp,
    All,
    /// A protocol this library has no label for; preserved rather than
    /// failing the translation
    Unrecognized,
}

/// One normalized ingress permission
///
/// The source is either a set of CIDR blocks, a set of tenant/group-name
/// pairs (cross-group references), or both; a permission with neither is
/// meaningless.  Providers represent cross-group references by name, by
/// id, or by owner+name pair; translators fold all three into
/// `tenant_id_group_name_pairs`.
#[derive(
    Clone,
    Debug,
    Default,
    Deserialize,
    Eq,
    JsonSchema,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub struct IpPermission {
    pub protocol: IpProtocol,
    pub from_port: u16,
    pub to_port: u16,
    pub cidr_blocks: BTreeSet<String>,
    pub tenant_id_group_name_pairs: BTreeMap<String, BTreeSet<String>>,
}

impl Default for IpProtocol {
    fn default() -> Self {
        IpProtocol::Tcp
    }
}

impl IpPermission {
    /// Whether the permission names at least one source.
    pub fn meaningful(&self) -> bool {
        !self.cidr_blocks.is_empty()
            || self
                .tenant_id_group_name_pairs
                .values()
                .any(|names| !names.is_empty())
    }
}

/// Portable view of a security group
#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
pub struct SecurityGroup {
    pub id: ScopedId,
    pub provider_id: String,
    pub name: String,
    pub location: Arc<Location>,
    pub ip_permissions: Vec<IpPermission>,
}

#[cfg(test)]
mod test {
    use super::*;

    fn provider_location() -> Arc<Location> {
        Arc::new(
            Location::new(LocationScope::Provider, "aws-ec2", "aws-ec2", None)
                .unwrap(),
        )
    }

    #[test]
    fn test_location_parent_chain_widens() {
        let provider = provider_location();
        let region = Arc::new(
            Location::new(
                LocationScope::Region,
                "us-east-1",
                "us-east-1",
                Some(provider.clone()),
            )
            .unwrap(),
        );
        let zone = Arc::new(
            Location::new(
                LocationScope::Zone,
                "us-east-1a",
                "us-east-1a",
                Some(region.clone()),
            )
            .unwrap(),
        );

        // A zone under a zone, or a region under a zone, is rejected.
        assert!(
            Location::new(
                LocationScope::Zone,
                "us-east-1b",
                "us-east-1b",
                Some(zone.clone())
            )
            .is_err()
        );
        assert!(
            Location::new(
                LocationScope::Region,
                "us-west-2",
                "us-west-2",
                Some(zone.clone())
            )
            .is_err()
        );

        assert_eq!(
            zone.find_in_chain(LocationScope::Region).map(|l| l.id.as_str()),
            Some("us-east-1")
        );
        assert_eq!(
            zone.find_in_chain(LocationScope::Provider)
                .map(|l| l.id.as_str()),
            Some("aws-ec2")
        );
        assert!(provider.find_in_chain(LocationScope::Zone).is_none());
    }

    #[test]
    fn test_node_state_mapping() {
        assert_eq!(NodeState::from_native_label("running"), NodeState::Running);
        assert_eq!(NodeState::from_native_label("ACTIVE"), NodeState::Running);
        assert_eq!(NodeState::from_native_label("pending"), NodeState::Pending);
        assert_eq!(
            NodeState::from_native_label("shutting-down"),
            NodeState::Terminated
        );
        assert_eq!(NodeState::from_native_label("error"), NodeState::Error);
        // Unknown native states must not fail the translation.
        assert_eq!(
            NodeState::from_native_label("hibernating-deluxe"),
            NodeState::Unrecognized
        );
    }

    #[test]
    fn test_image_state_mapping() {
        assert_eq!(
            ImageState::from_native_label("available"),
            ImageState::Available
        );
        assert_eq!(
            ImageState::from_native_label("pending"),
            ImageState::Pending
        );
        assert_eq!(
            ImageState::from_native_label("somethingelse"),
            ImageState::Unrecognized
        );
    }

    #[test]
    fn test_ip_permission_meaningful() {
        let mut permission = IpPermission {
            protocol: IpProtocol::Tcp,
            from_port: 22,
            to_port: 22,
            ..Default::default()
        };
        assert!(!permission.meaningful());

        permission.cidr_blocks.insert("0.0.0.0/0".to_string());
        assert!(permission.meaningful());

        let mut by_group = IpPermission {
            protocol: IpProtocol::Tcp,
            from_port: 22,
            to_port: 22,
            ..Default::default()
        };
        by_group
            .tenant_id_group_name_pairs
            .entry("tenant-1".to_string())
            .or_default()
            .insert("web".to_string());
        assert!(by_group.meaningful());
    }

    #[test]
    fn test_node_rebuild_does_not_mutate_original() {
        let location = provider_location();
        let id = ScopedId::scoped("us-east-1", "i-2baa5550").unwrap();
        let node = NodeMetadata::builder(
            id,
            "i-2baa5550",
            location,
            NodeState::Running,
        )
        .group("web")
        .build();

        let renamed = node.rebuild().name("web-2baa5550").build();
        assert_eq!(node.name, "i-2baa5550");
        assert_eq!(renamed.name, "web-2baa5550");
        assert_eq!(renamed.id, node.id);
    }
}
