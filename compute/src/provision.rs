// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Node provisioning workflow
//!
//! Creating a usable node is a multi-call conversation with the
//! provider: ensure the group's incidental resources exist (key pair,
//! security group, optionally a placement group), submit the creation,
//! poll the describe call until the node runs, then apply the
//! post-creation side effects the provider does not perform on its own
//! (tag propagation for spot requests, generated names, floating IPs).
//! Teardown walks the same list in reverse, tolerating the transient
//! "still in use" conditions that concurrent creations cause.
//!
//! Per node the lifecycle is strictly ordered: submitted, then polling,
//! then running / failed / timed out.  Across the nodes of one request
//! there is no ordering at all; each submission is independent and a
//! partial failure returns the succeeded subset alongside the failures.
//!
//! Every polling loop carries a deadline via its backoff policy, and
//! dropping a returned future stops the loop issuing further provider
//! calls (cooperative cancellation).

use crate::cache::KeyedCache;
use crate::config::ProvisioningConfig;
use crate::loaders::FloatingIpLoader;
use crate::loaders::KeyPairLoader;
use crate::loaders::PlacementGroupLoader;
use crate::loaders::SecurityGroupForGroupLoader;
use crate::location::LocationIndexSupplier;
use crate::naming::GroupNaming;
use crate::provider::CloudProvider;
use crate::provider::NativeServer;
use crate::provider::RunInstanceParams;
use crate::translate::NodeTranslator;
use crate::translate::flavor_to_hardware;
use slog::Logger;
use slog::debug;
use slog::info;
use slog::o;
use slog::warn;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use stratus_common::ScopeAndName;
use stratus_common::ScopedId;
use stratus_common::api::Credentials;
use stratus_common::api::Error;
use stratus_common::api::Hardware;
use stratus_common::api::NodeMetadata;
use stratus_common::api::NodeState;
use stratus_common::backoff;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Providers cap metadata/tag maps; validate before any network call.
const MAX_USER_METADATA_ENTRIES: usize = 32;

/// Where login credentials for generated key pairs are persisted.
///
/// The store itself (its durability, encryption, ...) is the caller's
/// concern; the workflow only writes entries after generating a key and
/// reads them back when assembling a node's login credentials.
pub type CredentialStore = Arc<Mutex<BTreeMap<ScopeAndName, Credentials>>>;

/// Key-pair behavior for a template.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum KeyPairOption {
    /// Generate a key pair per group and persist it in the credential
    /// store
    #[default]
    Generate,
    /// Use an existing provider-side key pair
    Named(String),
    /// Launch without a key pair
    None,
}

/// Options applied to every node of a creation request.
#[derive(Clone, Debug, Default)]
pub struct TemplateOptions {
    /// Additional provider-native security group names beyond the
    /// group's own
    pub security_groups: Vec<String>,
    pub key_pair: KeyPairOption,
    pub user_metadata: BTreeMap<String, String>,
    pub user_data: Option<Vec<u8>>,
    /// Maximum spot/preemptible price; `Some` routes the submission
    /// through the provider's spot path, which does not propagate tags
    /// on its own
    pub spot_price: Option<f64>,
    /// Whether to place the group's nodes in a placement group
    pub placement_group: bool,
    /// Whether to allocate and associate a floating IP per node
    pub auto_assign_floating_ip: bool,
}

/// What to launch and where.
#[derive(Clone, Debug)]
pub struct Template {
    pub image_id: String,
    pub hardware_id: String,
    /// Region or zone to launch into; must appear in the provider's
    /// location listing
    pub scope: String,
    pub options: TemplateOptions,
}

/// One node that could not be started.
#[derive(Clone, Debug)]
pub struct NodeFailure {
    /// Position within the request (0-based)
    pub index: u32,
    /// Provider id, when the submission got far enough to have one
    pub provider_id: Option<String>,
    pub cause: Error,
}

/// Failure modes of [`NodeProvisioner::create_nodes_in_group`].
#[derive(Clone, Debug, thiserror::Error)]
pub enum RunNodesError {
    /// Nothing was submitted: validation or incidental-resource setup
    /// failed before the first creation call.
    #[error(transparent)]
    Setup(#[from] Error),
    /// Some (possibly zero) nodes started and the rest did not.  The
    /// succeeded subset is fully usable; per-node causes are recorded
    /// individually.
    #[error(
        "failed to start {} of the requested node(s) in group {group:?}",
        .failures.len()
    )]
    Incomplete {
        group: String,
        succeeded: Vec<NodeMetadata>,
        failures: Vec<NodeFailure>,
    },
}

struct Inner<P: CloudProvider> {
    provider: Arc<P>,
    log: Logger,
    config: ProvisioningConfig,
    naming: GroupNaming,
    locations: LocationIndexSupplier<P>,
    floating_ips: Arc<KeyedCache<ScopedId, Vec<String>>>,
    placement_groups: KeyedCache<ScopeAndName, String>,
    security_groups: KeyedCache<ScopeAndName, String>,
    key_pairs: KeyedCache<ScopeAndName, String>,
    credentials: CredentialStore,
}

/// The provider-agnostic node-creation workflow.  Cheap to clone; all
/// clones share the same caches and credential store.
pub struct NodeProvisioner<P: CloudProvider> {
    inner: Arc<Inner<P>>,
}

impl<P: CloudProvider> Clone for NodeProvisioner<P> {
    fn clone(&self) -> Self {
        NodeProvisioner { inner: self.inner.clone() }
    }
}

impl<P: CloudProvider> NodeProvisioner<P> {
    pub fn new(
        provider: Arc<P>,
        log: Logger,
        config: ProvisioningConfig,
        naming: GroupNaming,
        credentials: CredentialStore,
    ) -> NodeProvisioner<P> {
        let log = log.new(o!("component" => "NodeProvisioner"));
        let floating_ips = Arc::new(KeyedCache::new(
            Arc::new(FloatingIpLoader::new(provider.clone())),
            log.new(o!("cache" => "floating-ips")),
        ));
        let placement_groups = KeyedCache::new(
            Arc::new(PlacementGroupLoader::new(
                provider.clone(),
                naming.clone(),
                log.new(o!("loader" => "placement-groups")),
            )),
            log.new(o!("cache" => "placement-groups")),
        );
        let security_groups = KeyedCache::new(
            Arc::new(SecurityGroupForGroupLoader::new(
                provider.clone(),
                naming.clone(),
                log.new(o!("loader" => "security-groups")),
            )),
            log.new(o!("cache" => "security-groups")),
        );
        let key_pairs = KeyedCache::new(
            Arc::new(KeyPairLoader::new(
                provider.clone(),
                naming.clone(),
                credentials.clone(),
                log.new(o!("loader" => "key-pairs")),
            )),
            log.new(o!("cache" => "key-pairs")),
        );
        NodeProvisioner {
            inner: Arc::new(Inner {
                locations: LocationIndexSupplier::new(provider.clone()),
                provider,
                log,
                config,
                naming,
                floating_ips,
                placement_groups,
                security_groups,
                key_pairs,
                credentials,
            }),
        }
    }

    /// The floating-IP cache shared with translators and extensions.
    pub fn floating_ip_cache(&self) -> Arc<KeyedCache<ScopedId, Vec<String>>> {
        self.inner.floating_ips.clone()
    }

    /// Creates `count` nodes in `group`, waiting for each to run.
    ///
    /// Submissions are independent: nodes may reach running in any
    /// order, and one node failing does not abort its siblings.  When
    /// any node fails, the result is [`RunNodesError::Incomplete`]
    /// carrying both the usable nodes and the per-node causes.
    pub async fn create_nodes_in_group(
        &self,
        group: &str,
        count: u32,
        template: &Template,
    ) -> Result<Vec<NodeMetadata>, RunNodesError> {
        let inner = &self.inner;
        inner.naming.validate_group(group)?;
        validate_user_metadata(&template.options.user_metadata)?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let index = inner.locations.get().await?;
        index.resolve(&template.scope).map_err(|_| {
            Error::invalid_value(
                "template.scope",
                &format!(
                    "{:?} is not in the provider's location listing",
                    template.scope
                ),
            )
        })?;

        let params = self.prepare_submission(group, template).await?;
        info!(inner.log, "creating nodes";
            "group" => group, "count" => count, "scope" => &template.scope);

        // Independent submission per node, bounded by the configured
        // parallelism.
        let semaphore =
            Arc::new(Semaphore::new(inner.config.max_parallelism.max(1)));
        let mut tasks: JoinSet<(u32, Result<NodeMetadata, NodeFailure>)> =
            JoinSet::new();
        for node_index in 0..count {
            let provisioner = self.clone();
            let params = params.clone();
            let group = group.to_owned();
            let options = template.options.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit =
                    semaphore.acquire_owned().await.expect("never closed");
                let result = provisioner
                    .start_one_node(&group, &params, &options)
                    .await
                    .map_err(|(provider_id, cause)| NodeFailure {
                        index: node_index,
                        provider_id,
                        cause,
                    });
                (node_index, result)
            });
        }

        let mut succeeded = Vec::new();
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (_, result) = joined.expect("node creation task panicked");
            match result {
                Ok(node) => succeeded.push(node),
                Err(failure) => {
                    warn!(inner.log, "node failed to start";
                        "group" => group,
                        "index" => failure.index,
                        "provider_id" => ?failure.provider_id,
                        "error" => %failure.cause);
                    failures.push(failure);
                }
            }
        }
        succeeded.sort_by(|a, b| a.provider_id.cmp(&b.provider_id));
        failures.sort_by_key(|failure| failure.index);

        if failures.is_empty() {
            Ok(succeeded)
        } else {
            Err(RunNodesError::Incomplete {
                group: group.to_owned(),
                succeeded,
                failures,
            })
        }
    }

    /// Resolves the template's options into concrete native parameters,
    /// creating the group's incidental resources as needed.
    async fn prepare_submission(
        &self,
        group: &str,
        template: &Template,
    ) -> Result<RunInstanceParams, Error> {
        let inner = &self.inner;
        let scope = template.scope.clone();

        // The key-pair cache single-flights creation: concurrent
        // requests for one group share a single create call.
        let key_name = match &template.options.key_pair {
            KeyPairOption::None => None,
            KeyPairOption::Named(name) => Some(name.clone()),
            KeyPairOption::Generate => Some(
                inner
                    .key_pairs
                    .get(&ScopeAndName::new(scope.as_str(), group))
                    .await?,
            ),
        };

        let shared_group = inner
            .security_groups
            .get(&ScopeAndName::new(scope.as_str(), group))
            .await?;
        let mut security_group_names = vec![shared_group];
        security_group_names
            .extend(template.options.security_groups.iter().cloned());

        let placement_group = if template.options.placement_group {
            Some(
                inner
                    .placement_groups
                    .get(&ScopeAndName::new(scope.as_str(), group))
                    .await?,
            )
        } else {
            None
        };

        Ok(RunInstanceParams {
            scope,
            image_id: template.image_id.clone(),
            flavor_id: template.hardware_id.clone(),
            name: None,
            key_name,
            security_group_names,
            placement_group,
            user_data: template.options.user_data.clone(),
            tags: template.options.user_metadata.clone(),
            spot_price: template.options.spot_price,
        })
    }

    /// Drives one node from submission to a translated, post-processed
    /// [`NodeMetadata`].  On failure, reports the provider id if the
    /// submission got that far.
    async fn start_one_node(
        &self,
        group: &str,
        params: &RunInstanceParams,
        options: &TemplateOptions,
    ) -> Result<NodeMetadata, (Option<String>, Error)> {
        let inner = &self.inner;

        // REQUESTED -> SUBMITTED
        let submitted = inner
            .provider
            .run_instance(params)
            .await
            .map_err(|error| (None, error))?;
        let provider_id = submitted.id.clone();
        debug!(inner.log, "submitted node";
            "group" => group, "provider_id" => &provider_id);

        // SUBMITTED -> POLLING -> RUNNING | TIMED_OUT
        let running = self
            .wait_for_running(&params.scope, &provider_id)
            .await
            .map_err(|error| (Some(provider_id.clone()), error))?;

        self.post_process(group, options, running)
            .await
            .map_err(|error| (Some(provider_id), error))
    }

    /// Polls the describe call until the node reaches `Running`.
    ///
    /// The poll interval is bounded and the loop gives up at the
    /// node-running deadline, surfacing [`Error::TimedOut`]; a node
    /// entering an error or terminated state fails immediately.
    async fn wait_for_running(
        &self,
        scope: &str,
        provider_id: &str,
    ) -> Result<NativeServer, Error> {
        let inner = &self.inner;
        let policy = backoff::poll_policy(
            inner.config.poll_initial_interval,
            inner.config.poll_max_interval,
            inner.config.node_running_timeout,
        );
        let poll = || async {
            let described = inner
                .provider
                .describe_instance(scope, provider_id)
                .await
                .map_err(|error| {
                    if error.retryable() {
                        backoff::BackoffError::transient(error)
                    } else {
                        backoff::BackoffError::Permanent(error)
                    }
                })?;
            let server = described.ok_or_else(|| {
                backoff::BackoffError::Permanent(Error::internal_error(
                    &format!(
                        "node {} disappeared while waiting for it to run",
                        provider_id
                    ),
                ))
            })?;
            match NodeState::from_native_label(&server.state) {
                NodeState::Running => Ok(server),
                NodeState::Error => {
                    Err(backoff::BackoffError::Permanent(
                        Error::internal_error(&format!(
                            "node {} entered state {:?}",
                            provider_id, server.state
                        )),
                    ))
                }
                NodeState::Terminated => {
                    Err(backoff::BackoffError::Permanent(
                        Error::internal_error(&format!(
                            "node {} terminated while waiting for it to run",
                            provider_id
                        )),
                    ))
                }
                _ => Err(backoff::BackoffError::transient(Error::timed_out(
                    &format!("node {} not yet running", provider_id),
                ))),
            }
        };
        let notify = |error: Error, delay| {
            debug!(inner.log, "still waiting for node";
                "provider_id" => provider_id, "delay" => ?delay,
                "last" => %error);
        };
        backoff::retry_notify(policy, poll, notify).await.map_err(|error| {
            match error {
                Error::TimedOut { .. } => Error::timed_out(&format!(
                    "node {} did not reach running within {:?}",
                    provider_id, inner.config.node_running_timeout
                )),
                other => other,
            }
        })
    }

    /// Side effects after a node runs: floating IP, tag propagation for
    /// spot submissions, generated names.  Returns the final portable
    /// view.
    async fn post_process(
        &self,
        group: &str,
        options: &TemplateOptions,
        server: NativeServer,
    ) -> Result<NodeMetadata, Error> {
        let inner = &self.inner;
        let scope = server.scope.clone();
        let node_id = if scope.is_empty() {
            ScopedId::new(None, server.id.as_str())?
        } else {
            ScopedId::scoped(scope.as_str(), server.id.as_str())?
        };

        if options.auto_assign_floating_ip {
            let address = inner.provider.allocate_address(&scope).await?;
            inner
                .provider
                .associate_address(&scope, &address.ip, &server.id)
                .await?;
            info!(inner.log, "associated floating IP";
                "provider_id" => &server.id, "ip" => &address.ip);
            // The cache may have loaded this node's (empty) address set
            // while the node was booting.
            inner.floating_ips.invalidate(&node_id);
        }

        // The provider's spot path accepts tags in the submission but
        // does not stamp them onto the eventual instance; propagate
        // them here once the instance exists.
        let mut tags = BTreeMap::new();
        if options.spot_price.is_some() && !options.user_metadata.is_empty() {
            tags.extend(options.user_metadata.clone());
        }
        if inner.config.generate_node_names
            && !options.user_metadata.contains_key("Name")
        {
            tags.insert(
                "Name".to_string(),
                generated_node_name(group, &server.id),
            );
        }
        if !tags.is_empty() && inner.provider.supports_tags(&scope) {
            debug!(inner.log, "applying tags";
                "provider_id" => &server.id, "tags" => ?tags);
            inner
                .provider
                .apply_tags(&scope, &[server.id.clone()], &tags)
                .await?;
        }

        let index = inner.locations.get().await?;
        let translator = NodeTranslator::new(
            index,
            inner.floating_ips.clone(),
            inner.naming.clone(),
        );
        let mut node = translator.translate(&server).await?;

        // The translated view reflects the describe call from before
        // the side effects above; fold them in without re-describing.
        let mut builder = node.rebuild().group(group);
        if let Some(name) = tags.get("Name") {
            let mut metadata = node.user_metadata.clone();
            metadata.extend(tags.clone());
            builder = builder.name(name).user_metadata(metadata);
        }
        if let Some(credentials) = self.stored_credentials(&scope, group) {
            builder = builder.credentials(credentials);
        }
        node = builder.build();
        Ok(node)
    }

    fn stored_credentials(
        &self,
        scope: &str,
        group: &str,
    ) -> Option<Credentials> {
        self.inner
            .credentials
            .lock()
            .unwrap()
            .get(&ScopeAndName::new(scope, group))
            .cloned()
    }

    /// Destroys a node.  Returns the node's last known view, or `None`
    /// if it did not exist (destroying an absent node is not an error).
    ///
    /// When the destroyed node was the last live member of its group in
    /// that scope, the group's incidental resources are cleaned up too.
    pub async fn destroy_node(
        &self,
        id: &ScopedId,
    ) -> Result<Option<NodeMetadata>, Error> {
        let inner = &self.inner;
        let scope = id.scope().unwrap_or("").to_owned();
        let Some(server) =
            inner.provider.describe_instance(&scope, id.native_id()).await?
        else {
            return Ok(None);
        };

        let index = inner.locations.get().await?;
        let translator = NodeTranslator::new(
            index,
            inner.floating_ips.clone(),
            inner.naming.clone(),
        );
        let node = translator.translate(&server).await?;

        self.release_floating_ips(&scope, id).await?;
        inner.provider.terminate_instance(&scope, id.native_id()).await?;
        info!(inner.log, "destroyed node"; "id" => %id);

        if let Some(group) = &node.group {
            if !self.group_has_live_nodes(&scope, group, id.native_id()).await?
            {
                self.clean_up_incidental_resources(&scope, group).await?;
            }
        }
        Ok(Some(node))
    }

    async fn release_floating_ips(
        &self,
        scope: &str,
        id: &ScopedId,
    ) -> Result<(), Error> {
        let inner = &self.inner;
        let Some(addresses) = inner.provider.list_addresses(scope).await?
        else {
            return Ok(());
        };
        for address in addresses {
            if address.instance_id.as_deref() == Some(id.native_id()) {
                inner.provider.release_address(scope, &address.ip).await?;
                debug!(inner.log, "released floating IP";
                    "id" => %id, "ip" => &address.ip);
            }
        }
        inner.floating_ips.invalidate(id);
        Ok(())
    }

    async fn group_has_live_nodes(
        &self,
        scope: &str,
        group: &str,
        excluding_id: &str,
    ) -> Result<bool, Error> {
        let naming = &self.inner.naming;
        let instances = self.inner.provider.list_instances(scope).await?;
        Ok(instances.iter().any(|server| {
            if server.id == excluding_id {
                return false;
            }
            if matches!(
                NodeState::from_native_label(&server.state),
                NodeState::Terminated
            ) {
                return false;
            }
            server
                .security_group_names
                .iter()
                .any(|name| naming.contains_group(name, group))
                || server
                    .key_name
                    .as_deref()
                    .map(|name| naming.contains_group(name, group))
                    .unwrap_or(false)
        }))
    }

    /// Deletes the incidental resources created for a group in a scope:
    /// the shared security group, the placement group, and the
    /// generated key pair.
    ///
    /// Each deletion is idempotent (existence is checked first) and
    /// "currently in use" is a non-fatal skip after a short retry — a
    /// concurrent creation may legitimately still be using the
    /// resource.  The corresponding cache entries are always
    /// invalidated so nothing stale is served afterwards.
    pub async fn clean_up_incidental_resources(
        &self,
        scope: &str,
        group: &str,
    ) -> Result<(), Error> {
        let inner = &self.inner;
        info!(inner.log, "cleaning up incidental resources";
            "scope" => scope, "group" => group);

        // Security group first: providers reject deleting a group that
        // an instance still references.  Each deletion tolerates "in
        // use" independently, and the key-pair pass re-checks live
        // instances itself.
        let shared_name = inner.naming.shared_name_for_group(group);
        if let Some(existing) = inner
            .provider
            .describe_security_group_by_name(scope, &shared_name)
            .await?
        {
            self.delete_tolerating_in_use("security group", || {
                let provider = inner.provider.clone();
                let group_id = existing.id.clone();
                let scope = scope.to_owned();
                async move {
                    provider.delete_security_group(&scope, &group_id).await
                }
            })
            .await?;
        }
        inner.security_groups.invalidate(&ScopeAndName::new(scope, group));

        let placement_name = inner.naming.placement_group_name(group, scope);
        if inner
            .provider
            .describe_placement_group(scope, &placement_name)
            .await?
            .is_some()
        {
            self.delete_tolerating_in_use("placement group", || {
                let provider = inner.provider.clone();
                let name = placement_name.clone();
                let scope = scope.to_owned();
                async move {
                    provider.delete_placement_group(&scope, &name).await
                }
            })
            .await?;
        }
        inner.placement_groups.invalidate(&ScopeAndName::new(scope, group));

        self.delete_key_pairs(scope, group).await?;
        inner.key_pairs.invalidate(&ScopeAndName::new(scope, group));
        Ok(())
    }

    /// Runs a deletion, retrying briefly while the provider reports the
    /// resource as transiently in use, and skipping (not failing) if it
    /// stays that way.  Non-transient errors propagate.
    async fn delete_tolerating_in_use<F, Fut>(
        &self,
        what: &str,
        mut attempt: F,
    ) -> Result<(), Error>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<bool, Error>>,
    {
        let inner = &self.inner;
        let policy =
            backoff::cleanup_retry_policy(inner.config.cleanup_retry_timeout);
        let result = backoff::retry(policy, || {
            let fut = attempt();
            async move {
                fut.await.map_err(|error| {
                    if error.retryable() {
                        backoff::BackoffError::transient(error)
                    } else {
                        backoff::BackoffError::Permanent(error)
                    }
                })
            }
        })
        .await;
        match result {
            Ok(_) => Ok(()),
            Err(error) if error.retryable() => {
                // Still in use after the retry window; a concurrent
                // creation owns it now.
                warn!(inner.log, "skipping in-use resource during cleanup";
                    "what" => what, "error" => %error);
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    /// Deletes the group's generated key pairs, unless a live instance
    /// still uses one, and drops the persisted credentials.
    async fn delete_key_pairs(
        &self,
        scope: &str,
        group: &str,
    ) -> Result<(), Error> {
        let inner = &self.inner;
        let instances = inner.provider.list_instances(scope).await?;
        for key_pair in inner.provider.list_key_pairs(scope).await? {
            if !inner.naming.contains_group(&key_pair.name, group) {
                continue;
            }
            let in_use = instances.iter().any(|server| {
                server.key_name.as_deref() == Some(key_pair.name.as_str())
                    && !matches!(
                        NodeState::from_native_label(&server.state),
                        NodeState::Terminated
                    )
            });
            if in_use {
                debug!(inner.log, "key pair still in use, keeping";
                    "name" => &key_pair.name);
                continue;
            }
            inner.provider.delete_key_pair(scope, &key_pair.name).await?;
            let mut store = inner.credentials.lock().unwrap();
            store.remove(&ScopeAndName::new(scope, key_pair.name.as_str()));
            store.remove(&ScopeAndName::new(scope, group));
            debug!(inner.log, "deleted key pair"; "name" => &key_pair.name);
        }
        Ok(())
    }

    /// The portable hardware profiles available in a scope.
    pub async fn hardware_profiles(
        &self,
        scope: &str,
    ) -> Result<Vec<Hardware>, Error> {
        let inner = &self.inner;
        let index = inner.locations.get().await?;
        let flavors = inner.provider.list_flavors(scope).await?;
        flavors
            .iter()
            .map(|flavor| flavor_to_hardware(flavor, &index))
            .collect()
    }
}

fn validate_user_metadata(
    metadata: &BTreeMap<String, String>,
) -> Result<(), Error> {
    if metadata.len() > MAX_USER_METADATA_ENTRIES {
        return Err(Error::invalid_value(
            "user_metadata",
            &format!(
                "at most {} entries are supported",
                MAX_USER_METADATA_ENTRIES
            ),
        ));
    }
    if metadata.keys().any(|key| key.is_empty()) {
        return Err(Error::invalid_value(
            "user_metadata",
            "keys must not be empty",
        ));
    }
    Ok(())
}

/// The generated display name for an instance: the trailing section of
/// the provider id grafted onto the group (`i-2baa5550` in group `web`
/// becomes `web-2baa5550`).
fn generated_node_name(group: &str, provider_id: &str) -> String {
    match provider_id.rsplit_once('-') {
        Some((_, suffix)) if !suffix.is_empty() => {
            format!("{}-{}", group, suffix)
        }
        _ => format!("{}-{}", group, provider_id),
    }
}
