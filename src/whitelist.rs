// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;

/// Immutable-for-the-process-lifetime set of literal IP strings loaded
/// at startup. Matching is exact string equality; there is no CIDR
/// containment check (see SPEC_FULL.md §9 — deliberate v0
/// simplification).
#[derive(Debug, Clone)]
pub struct Whitelist {
    entries: HashSet<String>,
}

impl Whitelist {
    pub fn new(entries: impl IntoIterator<Item = String>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn contains(&self, ip: &str) -> bool {
        self.entries.contains(ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_only() {
        let wl = Whitelist::new(["203.0.113.5".to_string()]);
        assert!(wl.contains("203.0.113.5"));
        assert!(!wl.contains("203.0.113.6"));
        // No CIDR containment: a /24 entry would not match a host IP
        // inside it, by design.
        let wl2 = Whitelist::new(["203.0.113.0/24".to_string()]);
        assert!(!wl2.contains("203.0.113.5"));
    }
}
