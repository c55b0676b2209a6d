// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Compound resource identities
//!
//! Provider-native ids are only unique within a region or availability
//! zone, so the portable id for a resource is the pair of its scope and
//! its native id, slash-encoded into a single string
//! (`"us-east-1/i-2baa5550"`).  Resources from providers without
//! regional scoping encode as the bare native id.

use crate::api::Error;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use std::fmt::Display;
use std::fmt::Formatter;
use std::str::FromStr;

/// The separator between the scope and the native id in an encoded id.
pub const SCOPE_SEPARATOR: char = '/';

/// A portable resource identity: a region or zone plus a provider-native
/// id, encoded as `scope/native_id` (or the bare native id when the
/// resource is unscoped).
///
/// Equality, ordering, and hashing are structural, so a `ScopedId` can
/// be used directly as a cache or map key.
#[derive(
    Clone,
    Debug,
    Deserialize,
    Eq,
    Hash,
    JsonSchema,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct ScopedId {
    scope: Option<String>,
    native_id: String,
}

impl ScopedId {
    /// Constructs an identity from a scope and a native id, validating
    /// that the encoding will round-trip.
    ///
    /// A scoped native id must not itself contain the separator: the
    /// decoder splits on the first `/`, so `new(Some("us-east-1"),
    /// "a/b")` would decode to a different identity than was encoded.
    pub fn new<S: Into<String>>(
        scope: Option<S>,
        native_id: S,
    ) -> Result<ScopedId, Error> {
        let scope = scope.map(Into::into).filter(|s| !s.is_empty());
        let native_id = native_id.into();

        if native_id.is_empty() {
            return Err(Error::invalid_value("native_id", "must not be empty"));
        }
        if let Some(scope) = &scope {
            if scope.contains(SCOPE_SEPARATOR) {
                return Err(Error::invalid_value(
                    "scope",
                    &format!("must not contain '{}'", SCOPE_SEPARATOR),
                ));
            }
            if native_id.contains(SCOPE_SEPARATOR) {
                return Err(Error::invalid_value(
                    "native_id",
                    &format!(
                        "must not contain '{}' when a scope is present \
                         (the encoding would not round-trip)",
                        SCOPE_SEPARATOR
                    ),
                ));
            }
        }
        Ok(ScopedId { scope, native_id })
    }

    /// Constructs a scoped identity; shorthand for [`ScopedId::new`]
    /// with a present scope.
    pub fn scoped<S: Into<String>>(
        scope: S,
        native_id: S,
    ) -> Result<ScopedId, Error> {
        ScopedId::new(Some(scope), native_id)
    }

    /// Decodes a slash-encoded identity.  This is total: an input with
    /// no separator is an unscoped id, and everything after the first
    /// separator is the native id.
    pub fn from_encoded(encoded: &str) -> ScopedId {
        match encoded.split_once(SCOPE_SEPARATOR) {
            Some((scope, native_id)) if !scope.is_empty() => ScopedId {
                scope: Some(scope.to_string()),
                native_id: native_id.to_string(),
            },
            Some((_, native_id)) => {
                ScopedId { scope: None, native_id: native_id.to_string() }
            }
            None => ScopedId { scope: None, native_id: encoded.to_string() },
        }
    }

    /// The region or zone qualifying the native id, if any.
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// The provider-native id.
    pub fn native_id(&self) -> &str {
        &self.native_id
    }

    /// Slash-encodes the identity.
    pub fn encode(&self) -> String {
        match &self.scope {
            Some(scope) => {
                format!("{}{}{}", scope, SCOPE_SEPARATOR, self.native_id)
            }
            None => self.native_id.clone(),
        }
    }
}

impl Display for ScopedId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl FromStr for ScopedId {
    type Err = Error;

    fn from_str(encoded: &str) -> Result<Self, Self::Err> {
        if encoded.is_empty() {
            return Err(Error::invalid_value("id", "must not be empty"));
        }
        Ok(ScopedId::from_encoded(encoded))
    }
}

impl TryFrom<String> for ScopedId {
    type Error = Error;

    fn try_from(encoded: String) -> Result<Self, Self::Error> {
        encoded.parse()
    }
}

impl From<ScopedId> for String {
    fn from(id: ScopedId) -> String {
        id.encode()
    }
}

/// A compound key pairing a scope with a caller-chosen name rather than
/// a provider-native id.  Used to key derived data that exists per node
/// group and region (placement groups, shared security groups, key-pair
/// credentials).
#[derive(
    Clone,
    Debug,
    Deserialize,
    Eq,
    Hash,
    JsonSchema,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub struct ScopeAndName {
    pub scope: String,
    pub name: String,
}

impl ScopeAndName {
    pub fn new<S: Into<String>>(scope: S, name: S) -> ScopeAndName {
        ScopeAndName { scope: scope.into(), name: name.into() }
    }
}

impl Display for ScopeAndName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.scope, SCOPE_SEPARATOR, self.name)
    }
}

#[cfg(test)]
mod test {
    use super::ScopedId;
    use crate::api::Error;

    #[test]
    fn test_round_trip() {
        // Any (scope, native id) pair accepted by the constructor must
        // survive encode/decode unchanged.
        let cases = [
            (Some("us-east-1"), "i-2baa5550"),
            (Some("az-1.region-a.geo-1"), "1234"),
            (None, "i-2baa5550"),
            (None, "vm-80"),
        ];
        for (scope, native_id) in cases {
            let id = ScopedId::new(scope, native_id).unwrap();
            let decoded = ScopedId::from_encoded(&id.encode());
            assert_eq!(id, decoded);
            assert_eq!(decoded.scope(), scope);
            assert_eq!(decoded.native_id(), native_id);
        }
    }

    #[test]
    fn test_unscoped_encoding_is_bare() {
        let id = ScopedId::new(None, "i-2baa5550").unwrap();
        assert_eq!(id.encode(), "i-2baa5550");
        assert_eq!(ScopedId::from_encoded("i-2baa5550"), id);
    }

    #[test]
    fn test_decode_splits_on_first_separator() {
        let id = ScopedId::from_encoded("us-east-1/a/b");
        assert_eq!(id.scope(), Some("us-east-1"));
        assert_eq!(id.native_id(), "a/b");
    }

    #[test]
    fn test_empty_scope_treated_as_unscoped() {
        let id = ScopedId::new(Some(""), "i-2baa5550").unwrap();
        assert_eq!(id.scope(), None);
        assert_eq!(id.encode(), "i-2baa5550");
    }

    #[test]
    fn test_ambiguous_native_id_rejected() {
        let error =
            ScopedId::scoped("us-east-1", "i-2baa/5550").unwrap_err();
        assert!(matches!(error, Error::InvalidValue { .. }));
        assert!(ScopedId::scoped("us/east", "i-2baa5550").is_err());
        assert!(ScopedId::new(None, "plain-id").is_ok());
    }

    #[test]
    fn test_display_and_parse() {
        let id = ScopedId::scoped("us-east-1", "ami-be3adfd7").unwrap();
        assert_eq!(id.to_string(), "us-east-1/ami-be3adfd7");
        let parsed: ScopedId = "us-east-1/ami-be3adfd7".parse().unwrap();
        assert_eq!(parsed, id);
        assert!("".parse::<ScopedId>().is_err());
    }
}
