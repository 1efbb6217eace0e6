//! External-binary availability cache (§3, §4.6 item 3). Cached per
//! process run and refreshable on demand; guarded by the registry's own
//! mutable-access discipline (§5 "guarded by the registry lock" — since
//! this cache only lives behind `&mut ToolRegistry`, Rust's aliasing
//! rules enforce that directly, with no separate lock object needed).

use std::collections::BTreeMap;

use crate::primitives::process::binary_available;

#[derive(Debug, Clone)]
pub struct BinaryAvailability {
    pub present: bool,
    pub path_hint: Option<String>,
    pub last_checked: chrono::DateTime<chrono::Utc>,
}

#[derive(Default)]
pub struct AvailabilityCache {
    entries: BTreeMap<String, BinaryAvailability>,
}

impl AvailabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_present(&self, binary: &str) -> bool {
        self.entries.get(binary).map(|a| a.present).unwrap_or(false)
    }

    pub fn get(&self, binary: &str) -> Option<&BinaryAvailability> {
        self.entries.get(binary)
    }

    /// Re-checks a single binary's availability and updates the cache.
    pub async fn refresh(&mut self, binary: &str) {
        let present = binary_available(binary).await;
        self.entries.insert(
            binary.to_string(),
            BinaryAvailability {
                present,
                path_hint: None,
                last_checked: chrono::Utc::now(),
            },
        );
    }

    pub fn snapshot(&self) -> Vec<(String, bool)> {
        self.entries
            .iter()
            .map(|(name, avail)| (name.clone(), avail.present))
            .collect()
    }
}
