//! Permission codes
//!
//! A user's permissions are a flat set of opaque codes such as
//! `"movies:write"`. Membership is exact string equality: there are no
//! wildcards and no hierarchy. The global list of valid codes lives in the
//! `permissions` table; the constants below are the ones seeded by the
//! migrations and referenced by route guards.

use serde::Serialize;
use std::collections::HashSet;

/// Read access to the catalog
pub const MOVIES_READ: &str = "movies:read";
/// Write access to the catalog
pub const MOVIES_WRITE: &str = "movies:write";
/// Grant permissions to other users
pub const PERMISSIONS_WRITE: &str = "permissions:write";

/// Codes granted to every newly registered user
pub const DEFAULT_USER_PERMISSIONS: &[&str] = &[MOVIES_READ];

/// Permission codes held by one user at query time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Permissions(HashSet<String>);

impl Permissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `code` is held, by exact match
    pub fn include(&self, code: &str) -> bool {
        self.0.contains(code)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Codes in sorted order, for stable output
    pub fn to_sorted_vec(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.0.iter().cloned().collect();
        codes.sort();
        codes
    }
}

impl<S: Into<String>> FromIterator<S> for Permissions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_include_exact_match() {
        let perms: Permissions = ["a", "b"].into_iter().collect();
        assert!(perms.include("a"));
        assert!(perms.include("b"));
        assert!(!perms.include("c"));
    }

    #[test]
    fn test_empty_set_includes_nothing() {
        let perms = Permissions::new();
        assert!(perms.is_empty());
        assert!(!perms.include("a"));
        assert!(!perms.include(""));
    }

    #[test]
    fn test_no_wildcard_or_prefix_semantics() {
        let perms: Permissions = ["movies:*", "movies"].into_iter().collect();
        assert!(!perms.include("movies:read"));
        assert!(!perms.include("movies:"));
        assert!(!perms.include("MOVIES"));
    }

    #[test]
    fn test_duplicates_collapse() {
        let perms: Permissions = ["movies:read", "movies:read"].into_iter().collect();
        assert_eq!(perms.len(), 1);
        assert_eq!(perms.to_sorted_vec(), vec!["movies:read".to_string()]);
    }
}
