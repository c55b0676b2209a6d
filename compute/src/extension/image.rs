// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Building machine images from running nodes
//!
//! Image creation is asynchronous on every provider that supports it:
//! the registration call returns a new image id immediately and the
//! image becomes usable only once the provider finishes snapshotting.
//! [`ImageExtension::create_image`] hides that by polling the new image
//! until it reaches `Available` (or the configured deadline passes).

use crate::config::ProvisioningConfig;
use crate::location::LocationIndexSupplier;
use crate::provider::CloudProvider;
use crate::translate::image_to_portable;
use slog::Logger;
use slog::debug;
use slog::info;
use slog::o;
use std::sync::Arc;
use stratus_common::ScopedId;
use stratus_common::api::Error;
use stratus_common::api::Image;
use stratus_common::api::ImageState;
use stratus_common::api::ResourceType;
use stratus_common::backoff;

/// A validated request to build an image from a running node.
///
/// Built via [`ImageExtension::build_image_template`], which checks the
/// source node actually exists; a template in hand means the creation
/// call can be submitted as-is.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageTemplate {
    node_id: ScopedId,
    name: String,
}

impl ImageTemplate {
    pub fn node_id(&self) -> &ScopedId {
        &self.node_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Image lifecycle operations for providers that support building
/// images from running nodes.
pub struct ImageExtension<P: CloudProvider> {
    provider: Arc<P>,
    locations: LocationIndexSupplier<P>,
    config: ProvisioningConfig,
    log: Logger,
}

impl<P: CloudProvider> ImageExtension<P> {
    pub fn new(
        provider: Arc<P>,
        log: Logger,
        config: ProvisioningConfig,
    ) -> ImageExtension<P> {
        ImageExtension {
            locations: LocationIndexSupplier::new(provider.clone()),
            provider,
            config,
            log: log.new(o!("component" => "ImageExtension")),
        }
    }

    /// Validates an image-from-node request.  Fails with
    /// [`Error::ObjectNotFound`] when the node does not exist; an image
    /// name must be non-empty and free of the id separator.
    pub async fn build_image_template(
        &self,
        node_id: &ScopedId,
        name: &str,
    ) -> Result<ImageTemplate, Error> {
        if name.is_empty() {
            return Err(Error::invalid_value(
                "name",
                "image name must not be empty",
            ));
        }
        if name.contains('/') {
            return Err(Error::invalid_value(
                "name",
                "image name must not contain '/'",
            ));
        }
        let scope = node_id.scope().unwrap_or("");
        let node = self
            .provider
            .describe_instance(scope, node_id.native_id())
            .await?;
        if node.is_none() {
            return Err(Error::not_found(
                ResourceType::Node,
                &node_id.encode(),
            ));
        }
        Ok(ImageTemplate {
            node_id: node_id.clone(),
            name: name.to_string(),
        })
    }

    /// Submits the image build and waits for the new image to become
    /// available.  The returned [`Image`] is usable immediately.
    pub async fn create_image(
        &self,
        template: &ImageTemplate,
    ) -> Result<Image, Error> {
        let scope = template.node_id.scope().unwrap_or("").to_owned();
        let image_id = self
            .provider
            .create_image(&scope, template.node_id.native_id(), &template.name)
            .await?;
        info!(self.log, "submitted image build";
            "node" => %template.node_id, "image_id" => &image_id,
            "name" => &template.name);

        let native = self.wait_for_available(&scope, &image_id).await?;
        let index = self.locations.get().await?;
        image_to_portable(&native, &index)
    }

    /// Deletes (deregisters) an image.  Returns false when the image
    /// was already gone.
    pub async fn delete_image(&self, id: &ScopedId) -> Result<bool, Error> {
        let scope = id.scope().unwrap_or("");
        let deleted =
            self.provider.deregister_image(scope, id.native_id()).await?;
        if deleted {
            info!(self.log, "deleted image"; "id" => %id);
        }
        Ok(deleted)
    }

    async fn wait_for_available(
        &self,
        scope: &str,
        image_id: &str,
    ) -> Result<crate::provider::NativeImage, Error> {
        let policy = backoff::poll_policy(
            self.config.poll_initial_interval,
            self.config.poll_max_interval,
            self.config.image_available_timeout,
        );
        let poll = || async {
            let described = self
                .provider
                .describe_image(scope, image_id)
                .await
                .map_err(|error| {
                    if error.retryable() {
                        backoff::BackoffError::transient(error)
                    } else {
                        backoff::BackoffError::Permanent(error)
                    }
                })?;
            let image = described.ok_or_else(|| {
                backoff::BackoffError::Permanent(Error::internal_error(
                    &format!(
                        "image {} disappeared while being registered",
                        image_id
                    ),
                ))
            })?;
            match ImageState::from_native_label(&image.state) {
                ImageState::Available => Ok(image),
                ImageState::Error => Err(backoff::BackoffError::Permanent(
                    Error::internal_error(&format!(
                        "image {} entered state {:?}",
                        image_id, image.state
                    )),
                )),
                _ => Err(backoff::BackoffError::transient(Error::timed_out(
                    &format!("image {} not yet available", image_id),
                ))),
            }
        };
        let notify = |error: Error, delay| {
            debug!(self.log, "still waiting for image";
                "image_id" => image_id, "delay" => ?delay, "last" => %error);
        };
        backoff::retry_notify(policy, poll, notify).await.map_err(|error| {
            match error {
                Error::TimedOut { .. } => Error::timed_out(&format!(
                    "image {} did not become available within {:?}",
                    image_id, self.config.image_available_timeout
                )),
                other => other,
            }
        })
    }
}
