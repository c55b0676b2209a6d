// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The provider call layer
//!
//! [`CloudProvider`] is the seam between this crate and the per-provider
//! request/response marshalling that lives elsewhere.  The trait deals
//! in native-shaped values (`NativeServer`, `NativeImage`, ...) that
//! carry provider ids and state labels verbatim; translation into the
//! portable model happens in [`crate::translate`].
//!
//! Return conventions are fixed per operation category rather than per
//! call site:
//!
//! - lookup by id returns `Ok(None)` when the resource does not exist;
//! - list operations return a possibly-empty `Vec` (and `Ok(None)` when
//!   the backing capability is not available in that scope at all);
//! - deletes of possibly-absent resources return `Ok(false)` when there
//!   was nothing to delete.
//!
//! "Not found" is therefore never an `Err` from a read; `Err` is
//! reserved for real provider failures.

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use std::collections::BTreeMap;
use stratus_common::api::Error;
use stratus_common::api::LocationScope;

/// One region or zone reported by the provider's location listing.
#[derive(Clone, Debug, PartialEq)]
pub struct NativeLocation {
    pub kind: LocationScope,
    pub id: String,
    pub description: String,
    /// Id of the enclosing location (a zone names its region); `None`
    /// hangs the location directly off the provider root.
    pub parent_id: Option<String>,
}

/// A server as the provider's describe call reports it.
#[derive(Clone, Debug, PartialEq)]
pub struct NativeServer {
    pub id: String,
    pub scope: String,
    pub name: Option<String>,
    /// Provider-native state label, unmapped (`"running"`, `"ACTIVE"`,
    /// ...)
    pub state: String,
    pub public_addresses: Vec<String>,
    pub private_addresses: Vec<String>,
    pub key_name: Option<String>,
    pub security_group_names: Vec<String>,
    pub tags: BTreeMap<String, String>,
}

/// A machine image as the provider reports it.
#[derive(Clone, Debug, PartialEq)]
pub struct NativeImage {
    pub id: String,
    pub scope: String,
    pub name: String,
    pub state: String,
    pub created: Option<DateTime<Utc>>,
    pub tags: BTreeMap<String, String>,
}

/// A hardware profile (instance type / flavor).
#[derive(Clone, Debug, PartialEq)]
pub struct NativeFlavor {
    pub id: String,
    pub scope: String,
    pub name: String,
    pub vcpus: u32,
    pub memory_mib: u64,
    pub volume_gib: u64,
}

/// An address allocated independently of any instance (floating /
/// elastic IP), possibly associated with one.
#[derive(Clone, Debug, PartialEq)]
pub struct NativeAddress {
    pub ip: String,
    pub instance_id: Option<String>,
}

/// A cross-group reference inside an ingress rule.  Providers express
/// these by name, by id, or by owner+name pair; any of the fields may
/// be absent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NativeGroupRef {
    pub tenant_id: Option<String>,
    pub group_name: Option<String>,
    pub group_id: Option<String>,
}

/// One native ingress rule.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NativeIngressRule {
    /// Native protocol label (`"tcp"`, `"udp"`, `"icmp"`, `"-1"`, ...)
    pub protocol: String,
    pub from_port: u16,
    pub to_port: u16,
    pub cidrs: Vec<String>,
    pub group_refs: Vec<NativeGroupRef>,
}

/// A security group as the provider reports it.
#[derive(Clone, Debug, PartialEq)]
pub struct NativeSecurityGroup {
    pub id: String,
    pub scope: String,
    pub name: String,
    pub tenant_id: Option<String>,
    pub rules: Vec<NativeIngressRule>,
}

/// A placement group as the provider reports it.
#[derive(Clone, Debug, PartialEq)]
pub struct NativePlacementGroup {
    pub name: String,
    pub state: String,
}

/// A key pair; `private_key` is only present in the creation response.
#[derive(Clone, Debug, PartialEq)]
pub struct NativeKeyPair {
    pub name: String,
    pub fingerprint: String,
    pub private_key: Option<String>,
}

/// Parameters for a single instance submission.
///
/// The provisioning workflow resolves a portable template down to this
/// shape before calling the provider; nothing here is portable.
#[derive(Clone, Debug, Default)]
pub struct RunInstanceParams {
    pub scope: String,
    pub image_id: String,
    pub flavor_id: String,
    pub name: Option<String>,
    pub key_name: Option<String>,
    pub security_group_names: Vec<String>,
    pub placement_group: Option<String>,
    pub user_data: Option<Vec<u8>>,
    pub tags: BTreeMap<String, String>,
    /// Maximum spot/preemptible price; `None` requests an on-demand
    /// instance
    pub spot_price: Option<f64>,
}

/// The calls this crate makes against a provider.
///
/// Implementations are per-provider glue living outside this crate.
/// Every method is treated as a black box that may block on the network;
/// callers never retry through this trait directly (retry policy
/// belongs to the workflow, not the transport).
#[async_trait]
pub trait CloudProvider: Send + Sync + 'static {
    /// A stable identifier for the provider, used as the root of the
    /// location tree (`"aws-ec2"`, `"openstack-nova"`, ...).
    fn provider_id(&self) -> &str;

    async fn list_locations(&self) -> Result<Vec<NativeLocation>, Error>;

    // Instances

    async fn run_instance(
        &self,
        params: &RunInstanceParams,
    ) -> Result<NativeServer, Error>;

    async fn describe_instance(
        &self,
        scope: &str,
        id: &str,
    ) -> Result<Option<NativeServer>, Error>;

    async fn list_instances(
        &self,
        scope: &str,
    ) -> Result<Vec<NativeServer>, Error>;

    /// Returns false when the instance was already gone.
    async fn terminate_instance(
        &self,
        scope: &str,
        id: &str,
    ) -> Result<bool, Error>;

    // Floating addresses.  `Ok(None)` from the listing means the
    // provider has no address extension in that scope; callers treat
    // that as "no floating IPs", not as an error.

    async fn list_addresses(
        &self,
        scope: &str,
    ) -> Result<Option<Vec<NativeAddress>>, Error>;

    async fn allocate_address(
        &self,
        scope: &str,
    ) -> Result<NativeAddress, Error>;

    async fn associate_address(
        &self,
        scope: &str,
        ip: &str,
        instance_id: &str,
    ) -> Result<(), Error>;

    async fn release_address(
        &self,
        scope: &str,
        ip: &str,
    ) -> Result<bool, Error>;

    // Tags.  Not every provider exposes a tag API; tag propagation is
    // skipped entirely where it's absent.

    fn supports_tags(&self, scope: &str) -> bool;

    async fn apply_tags(
        &self,
        scope: &str,
        instance_ids: &[String],
        tags: &BTreeMap<String, String>,
    ) -> Result<(), Error>;

    // Images

    /// Submits "create image from running instance"; returns the new
    /// native image id immediately (the image will not be usable until
    /// its state reaches an available label).
    async fn create_image(
        &self,
        scope: &str,
        instance_id: &str,
        name: &str,
    ) -> Result<String, Error>;

    async fn describe_image(
        &self,
        scope: &str,
        image_id: &str,
    ) -> Result<Option<NativeImage>, Error>;

    async fn deregister_image(
        &self,
        scope: &str,
        image_id: &str,
    ) -> Result<bool, Error>;

    // Hardware profiles

    async fn list_flavors(
        &self,
        scope: &str,
    ) -> Result<Vec<NativeFlavor>, Error>;

    // Security groups

    async fn list_security_groups(
        &self,
        scope: &str,
    ) -> Result<Vec<NativeSecurityGroup>, Error>;

    async fn describe_security_group(
        &self,
        scope: &str,
        id: &str,
    ) -> Result<Option<NativeSecurityGroup>, Error>;

    async fn describe_security_group_by_name(
        &self,
        scope: &str,
        name: &str,
    ) -> Result<Option<NativeSecurityGroup>, Error>;

    async fn create_security_group(
        &self,
        scope: &str,
        name: &str,
    ) -> Result<(), Error>;

    async fn delete_security_group(
        &self,
        scope: &str,
        id: &str,
    ) -> Result<bool, Error>;

    async fn authorize_ingress(
        &self,
        scope: &str,
        group_id: &str,
        rule: &NativeIngressRule,
    ) -> Result<(), Error>;

    /// The names of the security groups attached to an instance;
    /// `Ok(None)` when the provider cannot report group membership per
    /// instance.
    async fn security_group_names_for_instance(
        &self,
        scope: &str,
        instance_id: &str,
    ) -> Result<Option<Vec<String>>, Error>;

    // Placement groups

    async fn describe_placement_group(
        &self,
        scope: &str,
        name: &str,
    ) -> Result<Option<NativePlacementGroup>, Error>;

    async fn create_placement_group(
        &self,
        scope: &str,
        name: &str,
    ) -> Result<(), Error>;

    /// May fail with a retryable [`Error::ServiceUnavailable`] while an
    /// instance in the group is still terminating.
    async fn delete_placement_group(
        &self,
        scope: &str,
        name: &str,
    ) -> Result<bool, Error>;

    // Key pairs

    async fn create_key_pair(
        &self,
        scope: &str,
        name: &str,
    ) -> Result<NativeKeyPair, Error>;

    async fn list_key_pairs(
        &self,
        scope: &str,
    ) -> Result<Vec<NativeKeyPair>, Error>;

    async fn delete_key_pair(
        &self,
        scope: &str,
        name: &str,
    ) -> Result<bool, Error>;
}
