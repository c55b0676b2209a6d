// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tunables for the provisioning workflow

use serde::Deserialize;
use serde::Serialize;
use std::time::Duration;

/// Timeouts, poll intervals, and batch limits for
/// [`crate::provision::NodeProvisioner`].
///
/// The defaults match what the supported providers need in practice:
/// instances generally boot within a couple of minutes but can take far
/// longer under load, and image registration (snapshotting volumes) is
/// slower still.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// Deadline for a created node to reach the running state
    pub node_running_timeout: Duration,
    /// Deadline for a registered image to become available
    pub image_available_timeout: Duration,
    /// How long teardown retries a deletion the provider reports as in
    /// use before skipping it
    pub cleanup_retry_timeout: Duration,
    /// First poll interval; doubles up to `poll_max_interval`
    pub poll_initial_interval: Duration,
    pub poll_max_interval: Duration,
    /// Maximum in-flight node creations per `create_nodes_in_group`
    /// call
    pub max_parallelism: usize,
    /// Whether to stamp a generated `Name` tag (derived from the group
    /// and the provider id) onto created instances
    pub generate_node_names: bool,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        ProvisioningConfig {
            node_running_timeout: Duration::from_secs(20 * 60),
            image_available_timeout: Duration::from_secs(45 * 60),
            cleanup_retry_timeout: Duration::from_secs(30),
            poll_initial_interval: Duration::from_secs(1),
            poll_max_interval: Duration::from_secs(10),
            max_parallelism: 16,
            generate_node_names: true,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: ProvisioningConfig =
            serde_json::from_str(r#"{ "max_parallelism": 4 }"#).unwrap();
        assert_eq!(config.max_parallelism, 4);
        assert_eq!(
            config.node_running_timeout,
            ProvisioningConfig::default().node_running_timeout
        );
        assert!(config.generate_node_names);
    }
}
