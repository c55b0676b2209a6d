// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Stratus
//!
//! Stratus maps the native resources of many cloud providers (servers,
//! images, flavors, security groups, floating IPs) onto one portable
//! domain model.  This crate implements the pieces shared by every
//! provider-facing crate: the compound resource identity scheme, the
//! portable resource types, the error taxonomy, and the retry policies
//! used when polling providers.
//!
//! Provider wire formats, signing, and HTTP transport are owned
//! elsewhere; nothing in this crate performs I/O.

pub mod api;
pub mod backoff;
pub mod identity;

pub use identity::ScopeAndName;
pub use identity::ScopedId;
