// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reserved names for library-created resources
//!
//! Incidental resources (per-group security groups, placement groups,
//! generated key pairs) are named with a reserved prefix so they can
//! coexist with user-created resources of the same native name and be
//! recognized again at teardown.

use stratus_common::api::Error;

/// The default reserved prefix.
pub const DEFAULT_PREFIX: &str = "stratus";

/// The default delimiter between name components.
pub const DEFAULT_DELIMITER: char = '#';

/// Naming convention for resources this library creates on behalf of a
/// node group.
#[derive(Clone, Debug)]
pub struct GroupNaming {
    prefix: String,
    delimiter: char,
}

impl Default for GroupNaming {
    fn default() -> Self {
        GroupNaming {
            prefix: DEFAULT_PREFIX.to_string(),
            delimiter: DEFAULT_DELIMITER,
        }
    }
}

impl GroupNaming {
    pub fn new(prefix: &str, delimiter: char) -> GroupNaming {
        GroupNaming { prefix: prefix.to_string(), delimiter }
    }

    /// Rejects group names that would collide with the convention
    /// itself.
    pub fn validate_group(&self, group: &str) -> Result<(), Error> {
        if group.is_empty() {
            return Err(Error::invalid_value("group", "must not be empty"));
        }
        if group.contains(self.delimiter) {
            return Err(Error::invalid_value(
                "group",
                &format!("must not contain '{}'", self.delimiter),
            ));
        }
        Ok(())
    }

    /// The reserved name shared by a group's incidental resources
    /// within one scope: `stratus#group`.
    pub fn shared_name_for_group(&self, group: &str) -> String {
        format!("{}{}{}", self.prefix, self.delimiter, group)
    }

    /// The reserved placement-group name, qualified by region because
    /// placement groups are not shared across regions:
    /// `stratus#group#region`.
    pub fn placement_group_name(&self, group: &str, region: &str) -> String {
        format!(
            "{}{}{}{}{}",
            self.prefix, self.delimiter, group, self.delimiter, region
        )
    }

    /// Extracts the group from a reserved shared name, or `None` if the
    /// name was not produced by this convention.
    pub fn group_from_shared_name<'a>(&self, name: &'a str) -> Option<&'a str> {
        let rest = name.strip_prefix(self.prefix.as_str())?;
        let mut chars = rest.chars();
        if chars.next() != Some(self.delimiter) {
            return None;
        }
        let group = chars.as_str();
        // A placement-group name has a trailing region component.
        let group = match group.split_once(self.delimiter) {
            Some((group, _region)) => group,
            None => group,
        };
        if group.is_empty() { None } else { Some(group) }
    }

    /// Whether a reserved name belongs to the given group.
    pub fn contains_group(&self, name: &str, group: &str) -> bool {
        self.group_from_shared_name(name) == Some(group)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_shared_name_round_trip() {
        let naming = GroupNaming::default();
        let shared = naming.shared_name_for_group("web");
        assert_eq!(shared, "stratus#web");
        assert_eq!(naming.group_from_shared_name(&shared), Some("web"));

        let placement = naming.placement_group_name("web", "us-east-1");
        assert_eq!(placement, "stratus#web#us-east-1");
        assert_eq!(naming.group_from_shared_name(&placement), Some("web"));
        assert!(naming.contains_group(&placement, "web"));
        assert!(!naming.contains_group(&placement, "db"));
    }

    #[test]
    fn test_foreign_names_not_claimed() {
        let naming = GroupNaming::default();
        assert_eq!(naming.group_from_shared_name("default"), None);
        assert_eq!(naming.group_from_shared_name("stratusweb"), None);
        assert_eq!(naming.group_from_shared_name("stratus#"), None);
    }

    #[test]
    fn test_group_validation() {
        let naming = GroupNaming::default();
        assert!(naming.validate_group("web-frontend").is_ok());
        assert!(naming.validate_group("").is_err());
        assert!(naming.validate_group("web#frontend").is_err());
    }
}
