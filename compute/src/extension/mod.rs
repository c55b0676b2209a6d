// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Optional provider capabilities
//!
//! Not every provider can build images from running nodes or manage
//! security groups as first-class objects.  Each extension is a
//! standalone façade over [`crate::provider::CloudProvider`] that a
//! provider context offers only when the underlying capability exists;
//! callers that obtain one can rely on the full portable contract.

pub mod image;
pub mod security_group;

pub use image::ImageExtension;
pub use image::ImageTemplate;
pub use security_group::SecurityGroupExtension;
