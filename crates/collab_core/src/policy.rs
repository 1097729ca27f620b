//! Injected authorization policy.
//!
//! # Invariants
//! - Principals are compared trimmed and ASCII-lowercased.
//! - Admin membership overrides read-only membership.

use crate::config::CollabConfig;
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    admins: HashSet<String>,
    read_only: HashSet<String>,
}

impl AccessPolicy {
    pub fn new<A, R>(admins: A, read_only: R) -> Self
    where
        A: IntoIterator,
        A::Item: AsRef<str>,
        R: IntoIterator,
        R::Item: AsRef<str>,
    {
        Self {
            admins: normalize_all(admins),
            read_only: normalize_all(read_only),
        }
    }

    /// Policy where everyone may comment.
    pub fn open() -> Self {
        Self::default()
    }

    pub fn from_config(config: &CollabConfig) -> Self {
        Self::new(&config.admin_principals, &config.read_only_principals)
    }

    pub fn is_admin(&self, principal: &str) -> bool {
        self.admins.contains(&normalize(principal))
    }

    pub fn is_read_only(&self, principal: &str) -> bool {
        let key = normalize(principal);
        !self.admins.contains(&key) && self.read_only.contains(&key)
    }

    /// Blank principals can never comment.
    pub fn can_comment(&self, principal: &str) -> bool {
        !principal.trim().is_empty() && !self.is_read_only(principal)
    }
}

fn normalize(principal: &str) -> String {
    principal.trim().to_ascii_lowercase()
}

fn normalize_all<I>(principals: I) -> HashSet<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    principals
        .into_iter()
        .map(|principal| normalize(principal.as_ref()))
        .filter(|principal| !principal.is_empty())
        .collect()
}
