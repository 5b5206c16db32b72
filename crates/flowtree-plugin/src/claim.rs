// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::fmt;

/// Two plugins asked for the same field on the same node. The first claim
/// stands; the rejected plugin is skipped for that node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimConflict {
    pub field: String,
    pub holder: String,
    pub rejected: String,
}

impl fmt::Display for ClaimConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "field_claim_conflict: {} already claimed by {}, rejected {}",
            self.field, self.holder, self.rejected
        )
    }
}

/// Per-node accumulator of field ownership. One instance per node, owned by
/// that node's worker; never shared across nodes.
#[derive(Debug, Default, Clone)]
pub struct ClaimSet {
    claims: BTreeMap<String, String>,
}

impl ClaimSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `fields` for `plugin`, all or nothing. On overlap with an
    /// earlier claim nothing is recorded and the conflict names both sides.
    pub fn try_claim(&mut self, plugin: &str, fields: &[String]) -> Result<(), ClaimConflict> {
        for field in fields {
            if let Some(holder) = self.claims.get(field) {
                return Err(ClaimConflict {
                    field: field.clone(),
                    holder: holder.clone(),
                    rejected: plugin.to_string(),
                });
            }
        }
        for field in fields {
            self.claims.insert(field.clone(), plugin.to_string());
        }
        Ok(())
    }

    /// Claim a single field during rebuild merging; first writer wins.
    pub fn try_claim_one(&mut self, plugin: &str, field: &str) -> Result<(), ClaimConflict> {
        if let Some(holder) = self.claims.get(field) {
            return Err(ClaimConflict {
                field: field.to_string(),
                holder: holder.clone(),
                rejected: plugin.to_string(),
            });
        }
        self.claims.insert(field.to_string(), plugin.to_string());
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.claims.contains_key(field)
    }

    #[must_use]
    pub fn holder(&self, field: &str) -> Option<&str> {
        self.claims.get(field).map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.claims.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_are_all_or_nothing() {
        let mut set = ClaimSet::new();
        set.try_claim("first", &["func".to_string()]).expect("first claim");
        let err = set
            .try_claim(
                "second",
                &["info".to_string(), "func".to_string()],
            )
            .expect_err("overlap must be rejected");
        assert_eq!(err.field, "func");
        assert_eq!(err.holder, "first");
        assert_eq!(err.rejected, "second");
        // The non-overlapping field must not have been taken either.
        assert!(!set.contains("info"));
    }

    #[test]
    fn holder_is_recorded_per_field() {
        let mut set = ClaimSet::new();
        set.try_claim("a", &["x".to_string(), "y".to_string()]).expect("claim");
        assert_eq!(set.holder("x"), Some("a"));
        assert_eq!(set.holder("z"), None);
        assert_eq!(set.len(), 2);
    }
}
