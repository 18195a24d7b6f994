//! Network addresses and the shared host index.
//!
//! File descriptors do not store replica host names directly. Every replica
//! host is interned into a [`HostIndex`] that is shared by all descriptors of
//! a table, and descriptors refer to hosts by slot number. Slots are stable
//! for the lifetime of the index: inserting an address that is already present
//! returns the existing slot.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A `hostname:port` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetworkAddress {
    /// Host name or IP literal.
    pub hostname: String,
    /// TCP port.
    pub port: u16,
}

impl NetworkAddress {
    /// Creates a new address.
    #[must_use]
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
        }
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)
    }
}

impl FromStr for NetworkAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidInput(format!("missing port in address '{s}'")))?;
        if host.is_empty() {
            return Err(Error::InvalidInput(format!("missing host in address '{s}'")));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| Error::InvalidInput(format!("invalid port in address '{s}': {e}")))?;
        Ok(Self::new(host, port))
    }
}

#[derive(Debug, Default)]
struct Inner {
    addresses: Vec<NetworkAddress>,
    slots: HashMap<NetworkAddress, usize>,
}

/// Shared, deduplicated table of network addresses.
///
/// Cloning a `HostIndex` yields another handle to the same table.
/// Thread-safe via `RwLock`.
#[derive(Debug, Clone, Default)]
pub struct HostIndex {
    inner: Arc<RwLock<Inner>>,
}

impl HostIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the slot of `address`, inserting it if absent.
    pub fn get_or_insert(&self, address: NetworkAddress) -> usize {
        if let Some(slot) = self.slot_of(&address) {
            return slot;
        }
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        // Another writer may have inserted it between the read and the write.
        if let Some(slot) = inner.slots.get(&address) {
            return *slot;
        }
        let slot = inner.addresses.len();
        inner.addresses.push(address.clone());
        inner.slots.insert(address, slot);
        slot
    }

    /// Returns the slot of `address` if it is present.
    #[must_use]
    pub fn slot_of(&self, address: &NetworkAddress) -> Option<usize> {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .slots
            .get(address)
            .copied()
    }

    /// Returns the address stored at `slot`.
    #[must_use]
    pub fn get(&self, slot: usize) -> Option<NetworkAddress> {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .addresses
            .get(slot)
            .cloned()
    }

    /// Returns the number of distinct addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .addresses
            .len()
    }

    /// Returns true if no address has been inserted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns all addresses in slot order.
    #[must_use]
    pub fn addresses(&self) -> Vec<NetworkAddress> {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .addresses
            .clone()
    }
}
