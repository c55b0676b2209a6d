// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Resolved location index
//!
//! The location tree is assembled once per provider context from the
//! provider's location listing and shared read-only by every
//! translator.  A scope that a later resource listing mentions but the
//! index does not know is a contract violation between the two provider
//! calls and fails hard; guessing would produce wrong portable ids.

use crate::provider::CloudProvider;
use crate::provider::NativeLocation;
use std::collections::BTreeMap;
use std::sync::Arc;
use stratus_common::api::Error;
use stratus_common::api::Location;
use stratus_common::api::LocationScope;
use tokio::sync::OnceCell;

/// An immutable map from scope id to resolved [`Location`].
#[derive(Debug)]
pub struct LocationIndex {
    provider_root: Arc<Location>,
    by_scope: BTreeMap<String, Arc<Location>>,
}

impl LocationIndex {
    /// Builds the index from a location listing.  Parents must widen
    /// (see [`Location::new`]); a native location naming an unknown
    /// parent is rejected.
    pub fn from_native(
        provider_id: &str,
        natives: &[NativeLocation],
    ) -> Result<LocationIndex, Error> {
        let provider_root = Arc::new(Location::new(
            LocationScope::Provider,
            provider_id,
            provider_id,
            None,
        )?);

        let mut by_scope: BTreeMap<String, Arc<Location>> = BTreeMap::new();
        // Regions resolve before the zones that name them as parents,
        // and zones before hosts.
        let mut ordered: Vec<&NativeLocation> = natives.iter().collect();
        ordered.sort_by_key(|native| match native.kind {
            LocationScope::Provider | LocationScope::Region => 0,
            LocationScope::Zone => 1,
            LocationScope::Host => 2,
        });

        for native in ordered {
            let parent = match &native.parent_id {
                Some(parent_id) => by_scope
                    .get(parent_id)
                    .ok_or_else(|| {
                        Error::inconsistent_state(&format!(
                            "location {} names unknown parent {}",
                            native.id, parent_id
                        ))
                    })?
                    .clone(),
                None => provider_root.clone(),
            };
            let location = Arc::new(Location::new(
                native.kind,
                &native.id,
                &native.description,
                Some(parent),
            )?);
            by_scope.insert(native.id.clone(), location);
        }

        Ok(LocationIndex { provider_root, by_scope })
    }

    /// Looks up the location for a resource's native scope.
    ///
    /// Absence is fatal: it means the location listing and the resource
    /// listing disagreed about the available scopes.
    pub fn resolve(&self, scope: &str) -> Result<Arc<Location>, Error> {
        self.by_scope.get(scope).cloned().ok_or_else(|| {
            Error::inconsistent_state(&format!(
                "resource scope {:?} is not in the provider's location \
                 listing",
                scope
            ))
        })
    }

    pub fn provider_root(&self) -> Arc<Location> {
        self.provider_root.clone()
    }

    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.by_scope.keys().map(String::as_str)
    }
}

/// Memoized supplier for the location index
///
/// The first caller pays for the listing call; everyone else shares the
/// resolved index for the life of the provider context.  A failed
/// listing is not memoized, so the next caller retries it.
pub struct LocationIndexSupplier<P> {
    provider: Arc<P>,
    cell: OnceCell<Arc<LocationIndex>>,
}

impl<P: CloudProvider> LocationIndexSupplier<P> {
    pub fn new(provider: Arc<P>) -> LocationIndexSupplier<P> {
        LocationIndexSupplier { provider, cell: OnceCell::new() }
    }

    pub async fn get(&self) -> Result<Arc<LocationIndex>, Error> {
        self.cell
            .get_or_try_init(|| async {
                let natives = self.provider.list_locations().await?;
                Ok(Arc::new(LocationIndex::from_native(
                    self.provider.provider_id(),
                    &natives,
                )?))
            })
            .await
            .cloned()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn natives() -> Vec<NativeLocation> {
        vec![
            // Deliberately listed child-first; the index orders parents
            // ahead of children itself.
            NativeLocation {
                kind: LocationScope::Zone,
                id: "us-east-1a".to_string(),
                description: "us-east-1a".to_string(),
                parent_id: Some("us-east-1".to_string()),
            },
            NativeLocation {
                kind: LocationScope::Region,
                id: "us-east-1".to_string(),
                description: "US East".to_string(),
                parent_id: None,
            },
        ]
    }

    #[test]
    fn test_builds_tree() {
        let index = LocationIndex::from_native("aws-ec2", &natives()).unwrap();
        let zone = index.resolve("us-east-1a").unwrap();
        assert_eq!(zone.scope, LocationScope::Zone);
        assert_eq!(
            zone.find_in_chain(LocationScope::Region)
                .map(|l| l.id.as_str()),
            Some("us-east-1")
        );
        assert_eq!(
            zone.find_in_chain(LocationScope::Provider)
                .map(|l| l.id.as_str()),
            Some("aws-ec2")
        );
    }

    #[test]
    fn test_unknown_scope_is_inconsistent_state() {
        let index = LocationIndex::from_native("aws-ec2", &natives()).unwrap();
        let error = index.resolve("eu-west-9").unwrap_err();
        assert!(matches!(error, Error::InconsistentState { .. }));
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let bad = vec![NativeLocation {
            kind: LocationScope::Zone,
            id: "zone-1".to_string(),
            description: "zone-1".to_string(),
            parent_id: Some("region-that-never-was".to_string()),
        }];
        assert!(matches!(
            LocationIndex::from_native("aws-ec2", &bad),
            Err(Error::InconsistentState { .. })
        ));
    }
}
