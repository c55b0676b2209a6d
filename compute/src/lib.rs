// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Provider-agnostic compute service
//!
//! This crate turns the native resources of a cloud provider into the
//! portable model defined in `stratus-common` and drives the multi-step
//! workflows that a single provider call cannot express:
//!
//! - [`provision::NodeProvisioner`] creates nodes in named groups,
//!   polls them to running, applies tags and floating IPs, and tears
//!   down the incidental resources (placement groups, generated key
//!   pairs, per-group security groups) a group leaves behind;
//! - [`cache::KeyedCache`] holds derived data (floating IPs, reserved
//!   group names) with single-flight loads and explicit invalidation;
//! - [`translate`] maps native servers, images, flavors, and security
//!   groups into portable values;
//! - [`extension`] exposes the optional image and security-group
//!   capabilities some providers advertise.
//!
//! The provider itself is an external collaborator behind the
//! [`provider::CloudProvider`] trait; this crate never sees a wire
//! format.

pub mod cache;
pub mod config;
pub mod extension;
pub mod loaders;
pub mod location;
pub mod naming;
pub mod provider;
pub mod provision;
pub mod translate;

#[cfg(any(test, feature = "testing"))]
pub mod fake;
