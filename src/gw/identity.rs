//! Cloud device id ↔ network EUI correlation

use std::collections::HashMap;

/// One-to-one mapping between cloud-assigned device ids and network EUIs.
///
/// Writes are last-write-wins: re-pointing an id drops its old EUI, and
/// claiming an EUI already owned by another id evicts that id, so the reverse
/// lookup is never ambiguous.
#[derive(Debug, Default)]
pub struct IdentityMap {
    by_id: HashMap<String, String>,
    by_eui: HashMap<String, String>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, device_id: &str, eui: &str) {
        if let Some(old_eui) = self.by_id.insert(device_id.to_string(), eui.to_string()) {
            if old_eui != eui {
                self.by_eui.remove(&old_eui);
            }
        }
        if let Some(previous_owner) = self.by_eui.insert(eui.to_string(), device_id.to_string()) {
            if previous_owner != device_id {
                self.by_id.remove(&previous_owner);
            }
        }
    }

    pub fn remove(&mut self, device_id: &str) -> Option<String> {
        let eui = self.by_id.remove(device_id)?;
        self.by_eui.remove(&eui);
        Some(eui)
    }

    /// Forward lookup, used for downstream sends and removals
    pub fn eui_for(&self, device_id: &str) -> Option<&str> {
        self.by_id.get(device_id).map(String::as_str)
    }

    /// Reverse lookup, used to attribute upstream messages
    pub fn device_for(&self, eui: &str) -> Option<&str> {
        self.by_eui.get(eui).map(String::as_str)
    }
}
