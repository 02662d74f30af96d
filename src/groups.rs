// src/groups.rs
use std::collections::HashMap;
use tracing::info;

use crate::models::{Group, WalletIdentity};

/// Disjoint identity groups, in creation order, with an address index.
#[derive(Debug, Clone, Default)]
pub struct GroupStore {
    groups: Vec<Group>,
    owner: HashMap<String, usize>,
}

impl GroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins `a` and `b`. If either is already grouped, the missing one is
    /// appended to that group; otherwise a new group keyed by `a` is founded.
    /// Returns the key of the group that now holds both.
    pub fn merge(&mut self, a: &WalletIdentity, b: &WalletIdentity) -> String {
        let existing = self
            .owner
            .get(&a.address)
            .or_else(|| self.owner.get(&b.address))
            .copied();

        match existing {
            Some(idx) => {
                for wallet in [a, b] {
                    if !self.owner.contains_key(&wallet.address) {
                        self.groups[idx].members.push(wallet.clone());
                        self.owner.insert(wallet.address.clone(), idx);
                    }
                }
                let key = self.groups[idx].key.clone();
                info!("Extended group {} to {} members", key, self.groups[idx].members.len());
                key
            }
            None => {
                let idx = self.groups.len();
                let mut members = vec![a.clone()];
                if b.address != a.address {
                    members.push(b.clone());
                }
                for wallet in &members {
                    self.owner.insert(wallet.address.clone(), idx);
                }
                self.groups.push(Group {
                    key: a.address.clone(),
                    members,
                });
                info!("Founded group {}", a.address);
                a.address.clone()
            }
        }
    }

    /// Key of the group owning `address`, if any.
    pub fn lookup_group(&self, address: &str) -> Option<&str> {
        self.owner
            .get(address)
            .map(|&idx| self.groups[idx].key.as_str())
    }

    pub fn group(&self, key: &str) -> Option<&Group> {
        self.owner
            .get(key)
            .map(|&idx| &self.groups[idx])
            .filter(|g| g.key == key)
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn wallet(addr: &str) -> WalletIdentity {
        WalletIdentity {
            address: addr.to_string(),
            display_name: format!("name-{addr}"),
        }
    }

    #[test]
    fn test_merge_founds_group_keyed_by_first() {
        let mut store = GroupStore::new();
        let key = store.merge(&wallet("0xAA"), &wallet("0xBB"));
        assert_eq!(key, "0xAA");
        assert_eq!(store.lookup_group("0xAA"), Some("0xAA"));
        assert_eq!(store.lookup_group("0xBB"), Some("0xAA"));
        assert_eq!(store.lookup_group("0xCC"), None);

        let members: Vec<&str> = store.groups()[0]
            .members
            .iter()
            .map(|m| m.address.as_str())
            .collect();
        assert_eq!(members, vec!["0xAA", "0xBB"]);
    }

    #[test]
    fn test_chained_merge_extends_existing_group() {
        let mut store = GroupStore::new();
        store.merge(&wallet("0xAA"), &wallet("0xBB"));
        // second wallet already grouped: joins under the original key
        let key = store.merge(&wallet("0xCC"), &wallet("0xBB"));
        assert_eq!(key, "0xAA");
        assert_eq!(store.groups().len(), 1);

        let group = store.group("0xAA").unwrap();
        let members: Vec<&str> = group.members.iter().map(|m| m.address.as_str()).collect();
        assert_eq!(members, vec!["0xAA", "0xBB", "0xCC"]);
        assert!(store.group("0xBB").is_none());
    }

    #[test]
    fn test_merging_already_grouped_pair_is_noop() {
        let mut store = GroupStore::new();
        store.merge(&wallet("0xAA"), &wallet("0xBB"));
        store.merge(&wallet("0xBB"), &wallet("0xAA"));
        assert_eq!(store.groups().len(), 1);
        assert_eq!(store.groups()[0].members.len(), 2);
    }

    proptest! {
        #[test]
        fn prop_groups_partition_addresses(
            merges in proptest::collection::vec((0u8..12, 0u8..12), 0..30)
        ) {
            let mut store = GroupStore::new();
            for (a, b) in merges {
                store.merge(&wallet(&format!("0x{a:02}")), &wallet(&format!("0x{b:02}")));
            }

            let mut seen = HashSet::new();
            for group in store.groups() {
                prop_assert_eq!(&group.members[0].address, &group.key);
                for member in &group.members {
                    prop_assert!(seen.insert(member.address.clone()));
                    prop_assert_eq!(store.lookup_group(&member.address), Some(group.key.as_str()));
                }
            }
        }
    }
}
