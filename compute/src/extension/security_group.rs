// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Security groups as first-class portable objects
//!
//! Every mutation here re-describes the group afterwards and returns
//! the translated result, so callers always hold the provider's view
//! rather than a locally patched one.  Groups created through this
//! extension get the reserved shared name for their node group, which
//! is what lets the node translator recover group membership later.

use crate::location::LocationIndexSupplier;
use crate::naming::GroupNaming;
use crate::provider::CloudProvider;
use crate::provider::NativeGroupRef;
use crate::provider::NativeIngressRule;
use crate::translate::security_group_to_portable;
use slog::Logger;
use slog::info;
use slog::o;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use stratus_common::ScopedId;
use stratus_common::api::Error;
use stratus_common::api::IpPermission;
use stratus_common::api::IpProtocol;
use stratus_common::api::ResourceType;
use stratus_common::api::SecurityGroup;

/// Security group operations for providers that expose groups as
/// manageable objects.
pub struct SecurityGroupExtension<P: CloudProvider> {
    provider: Arc<P>,
    locations: LocationIndexSupplier<P>,
    naming: GroupNaming,
    log: Logger,
}

impl<P: CloudProvider> SecurityGroupExtension<P> {
    pub fn new(
        provider: Arc<P>,
        log: Logger,
        naming: GroupNaming,
    ) -> SecurityGroupExtension<P> {
        SecurityGroupExtension {
            locations: LocationIndexSupplier::new(provider.clone()),
            provider,
            naming,
            log: log.new(o!("component" => "SecurityGroupExtension")),
        }
    }

    /// All security groups across the provider's scopes.
    ///
    /// Every listed scope is queried, since providers differ on whether
    /// groups live at region or zone level; a group reported under both
    /// its zone and its region appears once.
    pub async fn list(&self) -> Result<Vec<SecurityGroup>, Error> {
        let index = self.locations.get().await?;
        let scopes: Vec<String> = index.scopes().map(str::to_owned).collect();
        let mut seen = BTreeSet::new();
        let mut groups = Vec::new();
        for scope in scopes {
            for native in self.provider.list_security_groups(&scope).await? {
                let portable = security_group_to_portable(&native, &index)?;
                if seen.insert(portable.id.encode()) {
                    groups.push(portable);
                }
            }
        }
        Ok(groups)
    }

    /// The security groups in one scope.
    pub async fn list_in_location(
        &self,
        scope: &str,
    ) -> Result<Vec<SecurityGroup>, Error> {
        let index = self.locations.get().await?;
        index.resolve(scope)?;
        self.provider
            .list_security_groups(scope)
            .await?
            .iter()
            .map(|native| security_group_to_portable(native, &index))
            .collect()
    }

    /// The security groups attached to a node.
    pub async fn list_for_node(
        &self,
        node_id: &ScopedId,
    ) -> Result<Vec<SecurityGroup>, Error> {
        let scope = node_id.scope().unwrap_or("");
        // Prefer the dedicated membership call; fall back to the names
        // on the describe response where the provider lacks one.
        let names = match self
            .provider
            .security_group_names_for_instance(scope, node_id.native_id())
            .await?
        {
            Some(names) => names,
            None => self
                .provider
                .describe_instance(scope, node_id.native_id())
                .await?
                .ok_or_else(|| {
                    Error::not_found(ResourceType::Node, &node_id.encode())
                })?
                .security_group_names,
        };

        let index = self.locations.get().await?;
        let mut groups = Vec::new();
        for name in names {
            // A name on the instance that no longer describes is a
            // group deleted concurrently; skip it.
            if let Some(native) = self
                .provider
                .describe_security_group_by_name(scope, &name)
                .await?
            {
                groups.push(security_group_to_portable(&native, &index)?);
            }
        }
        Ok(groups)
    }

    /// Looks up one group by its portable id.
    pub async fn get_by_id(
        &self,
        id: &ScopedId,
    ) -> Result<Option<SecurityGroup>, Error> {
        let scope = id.scope().unwrap_or("");
        let Some(native) =
            self.provider.describe_security_group(scope, id.native_id()).await?
        else {
            return Ok(None);
        };
        let index = self.locations.get().await?;
        Ok(Some(security_group_to_portable(&native, &index)?))
    }

    /// Creates the shared security group for a node group in a scope
    /// and returns its portable view.  Idempotent: an existing group
    /// with the reserved name is returned as-is.
    pub async fn create_security_group(
        &self,
        group: &str,
        scope: &str,
    ) -> Result<SecurityGroup, Error> {
        self.naming.validate_group(group)?;
        let index = self.locations.get().await?;
        index.resolve(scope)?;

        let name = self.naming.shared_name_for_group(group);
        if self
            .provider
            .describe_security_group_by_name(scope, &name)
            .await?
            .is_none()
        {
            self.provider.create_security_group(scope, &name).await?;
            info!(self.log, "created security group";
                "scope" => scope, "name" => &name);
        }
        // Re-describe: the provider assigns the id.
        let native = self
            .provider
            .describe_security_group_by_name(scope, &name)
            .await?
            .ok_or_else(|| {
                Error::inconsistent_state(&format!(
                    "security group {:?} not describable after creation",
                    name
                ))
            })?;
        security_group_to_portable(&native, &index)
    }

    /// Removes a group by portable id.  Returns false when it was
    /// already gone.
    pub async fn remove_security_group(
        &self,
        id: &ScopedId,
    ) -> Result<bool, Error> {
        let scope = id.scope().unwrap_or("");
        if self
            .provider
            .describe_security_group(scope, id.native_id())
            .await?
            .is_none()
        {
            return Ok(false);
        }
        let removed =
            self.provider.delete_security_group(scope, id.native_id()).await?;
        if removed {
            info!(self.log, "removed security group"; "id" => %id);
        }
        Ok(removed)
    }

    /// Authorizes one ingress permission and returns the group's
    /// updated portable view.
    pub async fn add_ip_permission(
        &self,
        permission: &IpPermission,
        group: &SecurityGroup,
    ) -> Result<SecurityGroup, Error> {
        if !permission.meaningful() {
            return Err(Error::invalid_value(
                "permission",
                "an ingress permission needs at least one CIDR block or \
                 group reference",
            ));
        }
        let rule = to_native_rule(permission)?;
        let scope = group.id.scope().unwrap_or("");
        self.provider
            .authorize_ingress(scope, &group.provider_id, &rule)
            .await?;
        info!(self.log, "authorized ingress";
            "group" => %group.id, "protocol" => ?permission.protocol,
            "from_port" => permission.from_port,
            "to_port" => permission.to_port);

        self.get_by_id(&group.id).await?.ok_or_else(|| {
            Error::inconsistent_state(&format!(
                "security group {} not describable after authorizing ingress",
                group.id
            ))
        })
    }

    /// Field-by-field variant of [`Self::add_ip_permission`]; both
    /// produce identical results for the same inputs.
    pub async fn add_ip_permission_params(
        &self,
        protocol: IpProtocol,
        from_port: u16,
        to_port: u16,
        tenant_id_group_name_pairs: &BTreeMap<String, BTreeSet<String>>,
        cidr_blocks: &[String],
        group: &SecurityGroup,
    ) -> Result<SecurityGroup, Error> {
        let permission = IpPermission {
            protocol,
            from_port,
            to_port,
            cidr_blocks: cidr_blocks.iter().cloned().collect(),
            tenant_id_group_name_pairs: tenant_id_group_name_pairs.clone(),
        };
        self.add_ip_permission(&permission, group).await
    }
}

fn to_native_rule(
    permission: &IpPermission,
) -> Result<NativeIngressRule, Error> {
    let protocol = match permission.protocol {
        IpProtocol::Tcp => "tcp",
        IpProtocol::Udp => "udp",
        IpProtocol::Icmp => "icmp",
        IpProtocol::All => "-1",
        IpProtocol::Unrecognized => {
            return Err(Error::invalid_value(
                "permission.protocol",
                "cannot authorize an unrecognized protocol",
            ));
        }
    };
    let mut group_refs = Vec::new();
    for (tenant, names) in &permission.tenant_id_group_name_pairs {
        for name in names {
            group_refs.push(NativeGroupRef {
                tenant_id: if tenant.is_empty() {
                    None
                } else {
                    Some(tenant.clone())
                },
                group_name: Some(name.clone()),
                group_id: None,
            });
        }
    }
    Ok(NativeIngressRule {
        protocol: protocol.to_string(),
        from_port: permission.from_port,
        to_port: permission.to_port,
        cidrs: permission.cidr_blocks.iter().cloned().collect(),
        group_refs,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fake::FakeProvider;
    use crate::provider::NativeServer;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, o!())
    }

    fn extension(
        provider: &Arc<FakeProvider>,
    ) -> SecurityGroupExtension<FakeProvider> {
        SecurityGroupExtension::new(
            provider.clone(),
            test_logger(),
            GroupNaming::default(),
        )
    }

    fn ssh_permission() -> IpPermission {
        IpPermission {
            protocol: IpProtocol::Tcp,
            from_port: 22,
            to_port: 40,
            cidr_blocks: ["0.0.0.0/0".to_string()].into_iter().collect(),
            ..IpPermission::default()
        }
    }

    #[tokio::test]
    async fn test_create_uses_reserved_name() {
        let provider = Arc::new(FakeProvider::new("nova"));
        provider.add_region("az-1");
        let extension = extension(&provider);

        let group =
            extension.create_security_group("web", "az-1").await.unwrap();
        assert_eq!(group.name, "stratus#web");
        assert_eq!(group.id.scope(), Some("az-1"));
        assert!(group.ip_permissions.is_empty());

        // Creating again returns the same group.
        let again =
            extension.create_security_group("web", "az-1").await.unwrap();
        assert_eq!(again.provider_id, group.provider_id);
    }

    #[tokio::test]
    async fn test_create_rejects_delimiter_in_group() {
        let provider = Arc::new(FakeProvider::new("nova"));
        provider.add_region("az-1");
        let extension = extension(&provider);

        let error = extension
            .create_security_group("web#1", "az-1")
            .await
            .unwrap_err();
        assert!(matches!(error, Error::InvalidValue { .. }));
    }

    #[tokio::test]
    async fn test_add_ip_permission_forms_are_equivalent() {
        let provider = Arc::new(FakeProvider::new("nova"));
        provider.add_region("az-1");
        let extension = extension(&provider);

        let group_a =
            extension.create_security_group("a", "az-1").await.unwrap();
        let group_b =
            extension.create_security_group("b", "az-1").await.unwrap();

        let via_permission = extension
            .add_ip_permission(&ssh_permission(), &group_a)
            .await
            .unwrap();
        let via_params = extension
            .add_ip_permission_params(
                IpProtocol::Tcp,
                22,
                40,
                &BTreeMap::new(),
                &["0.0.0.0/0".to_string()],
                &group_b,
            )
            .await
            .unwrap();

        assert_eq!(via_permission.ip_permissions, via_params.ip_permissions);
        assert_eq!(via_permission.ip_permissions.len(), 1);
        assert_eq!(via_permission.ip_permissions[0], ssh_permission());
    }

    #[tokio::test]
    async fn test_add_empty_permission_rejected() {
        let provider = Arc::new(FakeProvider::new("nova"));
        provider.add_region("az-1");
        let extension = extension(&provider);
        let group =
            extension.create_security_group("web", "az-1").await.unwrap();

        let error = extension
            .add_ip_permission(&IpPermission::default(), &group)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::InvalidValue { .. }));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let provider = Arc::new(FakeProvider::new("nova"));
        provider.add_region("az-1");
        let extension = extension(&provider);
        let group =
            extension.create_security_group("web", "az-1").await.unwrap();

        assert!(extension.remove_security_group(&group.id).await.unwrap());
        // Second removal finds nothing and reports false, not an error.
        assert!(!extension.remove_security_group(&group.id).await.unwrap());
        assert!(extension.get_by_id(&group.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_for_node() {
        let provider = Arc::new(FakeProvider::new("nova"));
        provider.add_region("az-1");
        let extension = extension(&provider);
        extension.create_security_group("web", "az-1").await.unwrap();

        provider.seed_instance(NativeServer {
            id: "srv-1".to_string(),
            scope: "az-1".to_string(),
            name: None,
            state: "ACTIVE".to_string(),
            public_addresses: vec![],
            private_addresses: vec![],
            key_name: None,
            security_group_names: vec!["stratus#web".to_string()],
            tags: BTreeMap::new(),
        });

        let node_id = ScopedId::scoped("az-1", "srv-1").unwrap();
        let groups = extension.list_for_node(&node_id).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "stratus#web");
    }

    #[tokio::test]
    async fn test_list_in_location() {
        let provider = Arc::new(FakeProvider::new("nova"));
        provider.add_region("az-1");
        provider.add_region("az-2");
        let extension = extension(&provider);
        extension.create_security_group("web", "az-1").await.unwrap();
        extension.create_security_group("db", "az-2").await.unwrap();

        let in_az1 = extension.list_in_location("az-1").await.unwrap();
        assert_eq!(in_az1.len(), 1);
        assert_eq!(in_az1[0].name, "stratus#web");

        let all = extension.list().await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_list_includes_zone_scoped_groups() {
        let provider = Arc::new(FakeProvider::new("nova"));
        provider.add_region("region-a");
        provider.add_zone("az-1", "region-a");
        let extension = extension(&provider);
        extension.create_security_group("web", "az-1").await.unwrap();

        let all = extension.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "stratus#web");
        assert_eq!(all[0].id.scope(), Some("az-1"));
    }
}
