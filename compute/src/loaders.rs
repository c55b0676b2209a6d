// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Loaders backing the derived-data caches
//!
//! Several kinds of derived data are cached per key: the floating IPs
//! attached to a node (a separate listing call on providers with an
//! address extension), and the reserved placement-group,
//! security-group, and key-pair names created on demand for a node
//! group.  The created-as-needed loaders verify existence before
//! reusing a name, so a resource deleted out from under the library is
//! recreated rather than assumed.  Running them behind a
//! [`crate::cache::KeyedCache`] also serializes creation: concurrent
//! requests for the same group share one create call.

use crate::cache::Loader;
use crate::naming::GroupNaming;
use crate::provider::CloudProvider;
use crate::provision::CredentialStore;
use async_trait::async_trait;
use slog::Logger;
use slog::debug;
use std::sync::Arc;
use stratus_common::ScopeAndName;
use stratus_common::ScopedId;
use stratus_common::api::Credentials;
use stratus_common::api::Error;

/// Looks up the floating IPs currently associated with a node.
///
/// A scope without an address extension yields an empty list, not an
/// error: "no floating IPs" and "cannot have floating IPs" are the same
/// thing to a caller assembling a node's public addresses.
pub struct FloatingIpLoader<P> {
    provider: Arc<P>,
}

impl<P> FloatingIpLoader<P> {
    pub fn new(provider: Arc<P>) -> FloatingIpLoader<P> {
        FloatingIpLoader { provider }
    }
}

#[async_trait]
impl<P: CloudProvider> Loader<ScopedId, Vec<String>> for FloatingIpLoader<P> {
    async fn load(&self, key: &ScopedId) -> Result<Vec<String>, Error> {
        let scope = key.scope().unwrap_or("");
        let addresses = match self.provider.list_addresses(scope).await? {
            Some(addresses) => addresses,
            None => return Ok(Vec::new()),
        };
        Ok(addresses
            .into_iter()
            .filter(|address| {
                address.instance_id.as_deref() == Some(key.native_id())
            })
            .map(|address| address.ip)
            .collect())
    }
}

/// Resolves (creating if needed) the placement group for a node group
/// in a region.  The value is the reserved name; the naming scheme is
/// deterministic, so the loader is a formatter plus an existence check.
pub struct PlacementGroupLoader<P> {
    provider: Arc<P>,
    naming: GroupNaming,
    log: Logger,
}

impl<P> PlacementGroupLoader<P> {
    pub fn new(
        provider: Arc<P>,
        naming: GroupNaming,
        log: Logger,
    ) -> PlacementGroupLoader<P> {
        PlacementGroupLoader { provider, naming, log }
    }
}

#[async_trait]
impl<P: CloudProvider> Loader<ScopeAndName, String> for PlacementGroupLoader<P> {
    async fn load(&self, key: &ScopeAndName) -> Result<String, Error> {
        let name = self.naming.placement_group_name(&key.name, &key.scope);
        let existing =
            self.provider.describe_placement_group(&key.scope, &name).await?;
        if existing.is_none() {
            debug!(self.log, "creating placement group";
                "region" => &key.scope, "name" => &name);
            self.provider.create_placement_group(&key.scope, &name).await?;
        }
        Ok(name)
    }
}

/// Resolves (creating if needed) the shared security group for a node
/// group in a scope.  The value is the reserved name the provider knows
/// the group by.
pub struct SecurityGroupForGroupLoader<P> {
    provider: Arc<P>,
    naming: GroupNaming,
    log: Logger,
}

impl<P> SecurityGroupForGroupLoader<P> {
    pub fn new(
        provider: Arc<P>,
        naming: GroupNaming,
        log: Logger,
    ) -> SecurityGroupForGroupLoader<P> {
        SecurityGroupForGroupLoader { provider, naming, log }
    }
}

#[async_trait]
impl<P: CloudProvider> Loader<ScopeAndName, String>
    for SecurityGroupForGroupLoader<P>
{
    async fn load(&self, key: &ScopeAndName) -> Result<String, Error> {
        let name = self.naming.shared_name_for_group(&key.name);
        let existing = self
            .provider
            .describe_security_group_by_name(&key.scope, &name)
            .await?;
        if existing.is_none() {
            debug!(self.log, "creating security group";
                "scope" => &key.scope, "name" => &name);
            self.provider.create_security_group(&key.scope, &name).await?;
        }
        Ok(name)
    }
}

/// Resolves (creating if needed) the generated key pair for a node
/// group in a scope, persisting the private key in the credential
/// store.  The value is the reserved key-pair name.
pub struct KeyPairLoader<P> {
    provider: Arc<P>,
    naming: GroupNaming,
    credentials: CredentialStore,
    log: Logger,
}

impl<P> KeyPairLoader<P> {
    pub fn new(
        provider: Arc<P>,
        naming: GroupNaming,
        credentials: CredentialStore,
        log: Logger,
    ) -> KeyPairLoader<P> {
        KeyPairLoader { provider, naming, credentials, log }
    }
}

#[async_trait]
impl<P: CloudProvider> Loader<ScopeAndName, String> for KeyPairLoader<P> {
    async fn load(&self, key: &ScopeAndName) -> Result<String, Error> {
        let name = self.naming.shared_name_for_group(&key.name);
        let stored = ScopeAndName::new(key.scope.as_str(), name.as_str());
        if self.credentials.lock().unwrap().contains_key(&stored) {
            return Ok(name);
        }

        let key_pair =
            self.provider.create_key_pair(&key.scope, &name).await?;
        let private_key = key_pair.private_key.ok_or_else(|| {
            Error::internal_error(
                "provider returned a generated key pair without material",
            )
        })?;
        debug!(self.log, "generated key pair";
            "scope" => &key.scope, "name" => &name,
            "fingerprint" => &key_pair.fingerprint);
        let credentials =
            Credentials { identity: name.clone(), credential: private_key };
        let mut store = self.credentials.lock().unwrap();
        store.insert(stored, credentials.clone());
        // Also findable by bare group name, for callers that never see
        // the reserved name.
        store.insert(key.clone(), credentials);
        Ok(name)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cache::KeyedCache;
    use crate::fake::FakeProvider;
    use slog::o;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, o!())
    }

    #[tokio::test]
    async fn test_floating_ip_loader_filters_by_instance() {
        let provider = Arc::new(FakeProvider::new("aws-ec2"));
        provider.add_address("us-east-1", "5.6.7.8", Some("i-2baa5550"));
        provider.add_address("us-east-1", "9.9.9.9", Some("i-other"));
        provider.add_address("us-east-1", "7.7.7.7", None);

        let loader = FloatingIpLoader::new(provider);
        let key = ScopedId::scoped("us-east-1", "i-2baa5550").unwrap();
        assert_eq!(loader.load(&key).await.unwrap(), vec!["5.6.7.8"]);
    }

    #[tokio::test]
    async fn test_missing_address_extension_is_empty() {
        let provider = Arc::new(FakeProvider::new("aws-ec2"));
        provider.disable_address_extension("us-east-1");

        let loader = FloatingIpLoader::new(provider);
        let key = ScopedId::scoped("us-east-1", "i-2baa5550").unwrap();
        assert_eq!(loader.load(&key).await.unwrap(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_placement_group_created_once() {
        let provider = Arc::new(FakeProvider::new("aws-ec2"));
        let cache = KeyedCache::new(
            Arc::new(PlacementGroupLoader::new(
                provider.clone(),
                GroupNaming::default(),
                test_logger(),
            )) as Arc<dyn Loader<ScopeAndName, String>>,
            test_logger(),
        );

        let key = ScopeAndName::new("us-east-1", "web");
        let name = cache.get(&key).await.unwrap();
        assert_eq!(name, "stratus#web#us-east-1");
        assert!(
            provider.placement_group_exists("us-east-1", &name),
            "loader should have created the group"
        );

        // Second get is served from cache; no second create.
        cache.get(&key).await.unwrap();
        assert_eq!(provider.placement_group_creates(), 1);
    }

    #[tokio::test]
    async fn test_placement_group_reused_when_present() {
        let provider = Arc::new(FakeProvider::new("aws-ec2"));
        provider.seed_placement_group("us-east-1", "stratus#web#us-east-1");

        let loader = PlacementGroupLoader::new(
            provider.clone(),
            GroupNaming::default(),
            test_logger(),
        );
        let name =
            loader.load(&ScopeAndName::new("us-east-1", "web")).await.unwrap();
        assert_eq!(name, "stratus#web#us-east-1");
        assert_eq!(provider.placement_group_creates(), 0);
    }

    #[tokio::test]
    async fn test_key_pair_reused_from_credential_store() {
        let provider = Arc::new(FakeProvider::new("aws-ec2"));
        let credentials: CredentialStore =
            Arc::new(Mutex::new(BTreeMap::new()));
        credentials.lock().unwrap().insert(
            ScopeAndName::new("us-east-1", "stratus#web"),
            Credentials {
                identity: "stratus#web".to_string(),
                credential: "pem".to_string(),
            },
        );

        let loader = KeyPairLoader::new(
            provider.clone(),
            GroupNaming::default(),
            credentials,
            test_logger(),
        );
        let name =
            loader.load(&ScopeAndName::new("us-east-1", "web")).await.unwrap();
        assert_eq!(name, "stratus#web");
        assert_eq!(provider.key_pair_creates(), 0);
    }

    #[tokio::test]
    async fn test_security_group_created_when_absent() {
        let provider = Arc::new(FakeProvider::new("nova"));
        let loader = SecurityGroupForGroupLoader::new(
            provider.clone(),
            GroupNaming::default(),
            test_logger(),
        );
        let name =
            loader.load(&ScopeAndName::new("az-1", "web")).await.unwrap();
        assert_eq!(name, "stratus#web");
        assert!(
            provider
                .security_group_by_name("az-1", "stratus#web")
                .is_some()
        );
    }
}
