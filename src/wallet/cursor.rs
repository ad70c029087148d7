//! Per-address-type receive/change index cursor, bounded per §3.

use crate::address::AddressType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const MAX_RECEIVE: i64 = 42;
pub const MAX_CHANGE: i64 = 10;

/// `highest_used` index, `-1` meaning "none issued". The next index is
/// `highest + 1`, capped at the relevant `MAX_*` bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub highest_used: i64,
}

impl Default for Branch {
    fn default() -> Self {
        Self { highest_used: -1 }
    }
}

#[derive(Debug, Default)]
pub struct AddressCursor {
    receive: HashMap<AddressType, Branch>,
    change: HashMap<AddressType, Branch>,
}

fn ordinal(kind: AddressType) -> &'static str {
    match kind {
        AddressType::P2pkh => "0",
        AddressType::P2shSegwit => "1",
        AddressType::P2wpkh => "2",
        AddressType::P2tr => "3",
    }
}

impl AddressCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_receive_index(&self, kind: AddressType) -> Option<i64> {
        let highest = self.receive.get(&kind).copied().unwrap_or_default().highest_used;
        let next = highest + 1;
        (next <= MAX_RECEIVE).then_some(next)
    }

    pub fn next_change_index(&self, kind: AddressType) -> Option<i64> {
        let highest = self.change.get(&kind).copied().unwrap_or_default().highest_used;
        let next = highest + 1;
        (next <= MAX_CHANGE).then_some(next)
    }

    pub fn mark_receive_used(&mut self, kind: AddressType, index: i64) {
        let branch = self.receive.entry(kind).or_default();
        branch.highest_used = branch.highest_used.max(index);
    }

    pub fn mark_change_used(&mut self, kind: AddressType, index: i64) {
        let branch = self.change.entry(kind).or_default();
        branch.highest_used = branch.highest_used.max(index);
    }

    /// Serialize as the `address_book_v1_<id>` JSON map: `"ordinal" → highest_index`.
    pub fn to_json_map(&self) -> HashMap<String, i64> {
        let mut out = HashMap::new();
        for (kind, branch) in &self.receive {
            out.insert(ordinal(*kind).to_string(), branch.highest_used);
        }
        out
    }

    pub fn load_from_json_map(&mut self, map: &HashMap<String, i64>) {
        for (ordinal_str, highest) in map {
            let kind = match ordinal_str.as_str() {
                "0" => AddressType::P2pkh,
                "1" => AddressType::P2shSegwit,
                "2" => AddressType::P2wpkh,
                "3" => AddressType::P2tr,
                _ => continue,
            };
            self.receive.insert(kind, Branch { highest_used: *highest });
        }
    }
}
