// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Native-to-portable resource translators
//!
//! Each translator takes a provider-native resource plus the resolved
//! location index and produces one portable value.  Translation never
//! guesses: a scope the index does not know fails with
//! `InconsistentState`.  Unknown state and protocol labels, by
//! contrast, map to `Unrecognized` — a provider adding a label must not
//! break existing clients.

use crate::cache::KeyedCache;
use crate::location::LocationIndex;
use crate::naming::GroupNaming;
use crate::provider::NativeFlavor;
use crate::provider::NativeImage;
use crate::provider::NativeSecurityGroup;
use crate::provider::NativeServer;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use stratus_common::ScopedId;
use stratus_common::api::Error;
use stratus_common::api::Hardware;
use stratus_common::api::Image;
use stratus_common::api::ImageState;
use stratus_common::api::IpPermission;
use stratus_common::api::IpProtocol;
use stratus_common::api::Location;
use stratus_common::api::NodeMetadata;
use stratus_common::api::NodeState;
use stratus_common::api::SecurityGroup;

fn resolve_scoped_id(
    index: &LocationIndex,
    scope: &str,
    native_id: &str,
) -> Result<(ScopedId, Arc<Location>), Error> {
    if scope.is_empty() {
        let id = ScopedId::new(None, native_id)?;
        return Ok((id, index.provider_root()));
    }
    let location = index.resolve(scope)?;
    let id = ScopedId::scoped(scope, native_id)?;
    Ok((id, location))
}

/// Translates native servers into [`NodeMetadata`], merging in floating
/// IPs from the derived-data cache.
pub struct NodeTranslator {
    locations: Arc<LocationIndex>,
    floating_ips: Arc<KeyedCache<ScopedId, Vec<String>>>,
    naming: GroupNaming,
}

impl NodeTranslator {
    pub fn new(
        locations: Arc<LocationIndex>,
        floating_ips: Arc<KeyedCache<ScopedId, Vec<String>>>,
        naming: GroupNaming,
    ) -> NodeTranslator {
        NodeTranslator { locations, floating_ips, naming }
    }

    pub async fn translate(
        &self,
        server: &NativeServer,
    ) -> Result<NodeMetadata, Error> {
        let (id, location) =
            resolve_scoped_id(&self.locations, &server.scope, &server.id)?;
        let state = NodeState::from_native_label(&server.state);

        // Public addresses come from two places: the describe call's
        // inline list, and floating IPs the provider only reports
        // through its address-listing extension.  Inline first,
        // deduplicated by value.
        let floating = self.floating_ips.get(&id).await?;
        let mut public_addresses = server.public_addresses.clone();
        for ip in floating {
            if !public_addresses.contains(&ip) {
                public_addresses.push(ip);
            }
        }

        let name = server
            .name
            .clone()
            .or_else(|| server.tags.get("Name").cloned())
            .unwrap_or_else(|| server.id.clone());

        let group = self.group_of(server);

        let mut builder =
            NodeMetadata::builder(id, &server.id, location, state)
                .name(&name)
                .public_addresses(public_addresses)
                .private_addresses(server.private_addresses.clone())
                .user_metadata(server.tags.clone());
        if let Some(group) = group {
            builder = builder.group(&group);
        }
        Ok(builder.build())
    }

    /// Recovers the node group from the reserved names the provisioning
    /// workflow stamped onto the instance (security group first, then
    /// key pair).
    fn group_of(&self, server: &NativeServer) -> Option<String> {
        server
            .security_group_names
            .iter()
            .find_map(|name| self.naming.group_from_shared_name(name))
            .or_else(|| {
                server
                    .key_name
                    .as_deref()
                    .and_then(|name| self.naming.group_from_shared_name(name))
            })
            .map(str::to_owned)
    }
}

/// Translates a native image into a portable [`Image`].
pub fn image_to_portable(
    image: &NativeImage,
    index: &LocationIndex,
) -> Result<Image, Error> {
    let (id, location) = resolve_scoped_id(index, &image.scope, &image.id)?;
    Ok(Image {
        id,
        provider_id: image.id.clone(),
        name: image.name.clone(),
        location,
        state: ImageState::from_native_label(&image.state),
        created: image.created,
        user_metadata: image.tags.clone(),
    })
}

/// Translates a native flavor into a portable [`Hardware`] profile.
pub fn flavor_to_hardware(
    flavor: &NativeFlavor,
    index: &LocationIndex,
) -> Result<Hardware, Error> {
    let (id, location) = resolve_scoped_id(index, &flavor.scope, &flavor.id)?;
    Ok(Hardware {
        id,
        provider_id: flavor.id.clone(),
        name: flavor.name.clone(),
        location,
        vcpus: flavor.vcpus,
        memory_mib: flavor.memory_mib,
        volume_gib: flavor.volume_gib,
    })
}

fn protocol_from_native_label(label: &str) -> IpProtocol {
    match label.to_ascii_lowercase().as_str() {
        "tcp" | "6" => IpProtocol::Tcp,
        "udp" | "17" => IpProtocol::Udp,
        "icmp" | "1" => IpProtocol::Icmp,
        "all" | "-1" => IpProtocol::All,
        _ => IpProtocol::Unrecognized,
    }
}

/// Translates a native security group into the portable shape,
/// normalizing CIDR-based and group-based rule sources uniformly.
///
/// Providers express a cross-group reference by name, by id, or by
/// owner+name pair; all three fold into the tenant-id → group-names
/// multimap, with the group's own tenant standing in when the rule
/// omits one.
pub fn security_group_to_portable(
    group: &NativeSecurityGroup,
    index: &LocationIndex,
) -> Result<SecurityGroup, Error> {
    let (id, location) = resolve_scoped_id(index, &group.scope, &group.id)?;

    let mut ip_permissions = Vec::new();
    for rule in &group.rules {
        let mut tenant_id_group_name_pairs: BTreeMap<
            String,
            BTreeSet<String>,
        > = BTreeMap::new();
        for group_ref in &rule.group_refs {
            let referenced = match (&group_ref.group_name, &group_ref.group_id)
            {
                (Some(name), _) => name.clone(),
                (None, Some(group_id)) => group_id.clone(),
                (None, None) => continue,
            };
            let tenant = group_ref
                .tenant_id
                .clone()
                .or_else(|| group.tenant_id.clone())
                .unwrap_or_default();
            tenant_id_group_name_pairs
                .entry(tenant)
                .or_default()
                .insert(referenced);
        }

        let permission = IpPermission {
            protocol: protocol_from_native_label(&rule.protocol),
            from_port: rule.from_port,
            to_port: rule.to_port,
            cidr_blocks: rule.cidrs.iter().cloned().collect(),
            tenant_id_group_name_pairs,
        };
        if permission.meaningful() {
            ip_permissions.push(permission);
        }
    }

    Ok(SecurityGroup {
        id,
        provider_id: group.id.clone(),
        name: group.name.clone(),
        location,
        ip_permissions,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fake::FakeProvider;
    use crate::loaders::FloatingIpLoader;
    use crate::provider::CloudProvider;
    use crate::provider::NativeGroupRef;
    use crate::provider::NativeIngressRule;
    use slog::Logger;
    use slog::o;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, o!())
    }

    async fn index_for(provider: &Arc<FakeProvider>) -> Arc<LocationIndex> {
        let natives = provider.list_locations().await.unwrap();
        Arc::new(
            LocationIndex::from_native(provider.provider_id(), &natives)
                .unwrap(),
        )
    }

    fn translator(
        provider: &Arc<FakeProvider>,
        index: Arc<LocationIndex>,
    ) -> NodeTranslator {
        let cache = Arc::new(KeyedCache::new(
            Arc::new(FloatingIpLoader::new(provider.clone())),
            test_logger(),
        ));
        NodeTranslator::new(index, cache, GroupNaming::default())
    }

    fn running_server(provider: &FakeProvider) -> NativeServer {
        let server = NativeServer {
            id: "i-2baa5550".to_string(),
            scope: "us-east-1".to_string(),
            name: None,
            state: "running".to_string(),
            public_addresses: vec!["1.2.3.4".to_string()],
            private_addresses: vec!["10.0.0.4".to_string()],
            key_name: None,
            security_group_names: vec!["stratus#web".to_string()],
            tags: BTreeMap::new(),
        };
        provider.seed_instance(server.clone());
        server
    }

    #[tokio::test]
    async fn test_floating_ip_merge_deduplicates() {
        let provider = Arc::new(FakeProvider::new("aws-ec2"));
        provider.add_region("us-east-1");
        // The provider reports 1.2.3.4 both inline and as a floating
        // IP, and 5.6.7.8 only through the address listing.
        provider.add_address("us-east-1", "1.2.3.4", Some("i-2baa5550"));
        provider.add_address("us-east-1", "5.6.7.8", Some("i-2baa5550"));

        let index = index_for(&provider).await;
        let server = running_server(&provider);
        let node =
            translator(&provider, index).translate(&server).await.unwrap();

        assert_eq!(node.public_addresses, vec!["1.2.3.4", "5.6.7.8"]);
        assert_eq!(node.state, NodeState::Running);
        assert_eq!(node.id.encode(), "us-east-1/i-2baa5550");
        assert_eq!(node.group.as_deref(), Some("web"));
    }

    #[tokio::test]
    async fn test_unknown_scope_fails_translation() {
        let provider = Arc::new(FakeProvider::new("aws-ec2"));
        provider.add_region("us-east-1");
        let index = index_for(&provider).await;

        let mut server = running_server(&provider);
        server.scope = "eu-central-9".to_string();

        let error = translator(&provider, index)
            .translate(&server)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::InconsistentState { .. }));
    }

    #[tokio::test]
    async fn test_unknown_state_is_unrecognized() {
        let provider = Arc::new(FakeProvider::new("aws-ec2"));
        provider.add_region("us-east-1");
        let index = index_for(&provider).await;

        let mut server = running_server(&provider);
        server.state = "quantum-flux".to_string();

        let node = translator(&provider, index)
            .translate(&server)
            .await
            .unwrap();
        assert_eq!(node.state, NodeState::Unrecognized);
    }

    #[test]
    fn test_security_group_normalization() {
        let provider = FakeProvider::new("nova");
        provider.add_region("az-1");
        let natives = futures::executor::block_on(provider.list_locations())
            .unwrap();
        let index =
            LocationIndex::from_native(provider.provider_id(), &natives)
                .unwrap();

        let native = NativeSecurityGroup {
            id: "sg-1234".to_string(),
            scope: "az-1".to_string(),
            name: "stratus#web".to_string(),
            tenant_id: Some("tenant-1".to_string()),
            rules: vec![
                NativeIngressRule {
                    protocol: "tcp".to_string(),
                    from_port: 22,
                    to_port: 22,
                    cidrs: vec!["0.0.0.0/0".to_string()],
                    group_refs: vec![],
                },
                // Cross-group reference by id only; the owning tenant
                // is inherited from the group itself.
                NativeIngressRule {
                    protocol: "tcp".to_string(),
                    from_port: 5432,
                    to_port: 5432,
                    cidrs: vec![],
                    group_refs: vec![NativeGroupRef {
                        tenant_id: None,
                        group_name: None,
                        group_id: Some("sg-5678".to_string()),
                    }],
                },
                // A rule with no source at all is dropped.
                NativeIngressRule {
                    protocol: "udp".to_string(),
                    from_port: 53,
                    to_port: 53,
                    cidrs: vec![],
                    group_refs: vec![NativeGroupRef::default()],
                },
            ],
        };

        let portable = security_group_to_portable(&native, &index).unwrap();
        assert_eq!(portable.id.encode(), "az-1/sg-1234");
        assert_eq!(portable.ip_permissions.len(), 2);

        let ssh = &portable.ip_permissions[0];
        assert_eq!(ssh.protocol, IpProtocol::Tcp);
        assert!(ssh.cidr_blocks.contains("0.0.0.0/0"));
        assert!(ssh.tenant_id_group_name_pairs.is_empty());

        let postgres = &portable.ip_permissions[1];
        assert!(postgres.cidr_blocks.is_empty());
        assert_eq!(
            postgres.tenant_id_group_name_pairs["tenant-1"],
            ["sg-5678".to_string()].into_iter().collect()
        );
    }

    #[test]
    fn test_flavor_translation() {
        let provider = FakeProvider::new("aws-ec2");
        provider.add_region("us-east-1");
        let natives = futures::executor::block_on(provider.list_locations())
            .unwrap();
        let index =
            LocationIndex::from_native(provider.provider_id(), &natives)
                .unwrap();

        let flavor = NativeFlavor {
            id: "m1.small".to_string(),
            scope: "us-east-1".to_string(),
            name: "m1.small".to_string(),
            vcpus: 1,
            memory_mib: 1740,
            volume_gib: 160,
        };
        let hardware = flavor_to_hardware(&flavor, &index).unwrap();
        assert_eq!(hardware.id.encode(), "us-east-1/m1.small");
        assert_eq!(hardware.vcpus, 1);
    }
}
