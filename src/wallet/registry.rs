use std::collections::HashMap;

use log::debug;

use super::Wallet;

/// Additive-only wallet store keyed by address. Wallets are never removed or
/// overwritten, which keeps the registry auditable: an address observed once
/// stays resolvable forever, and lookups racing with creation simply see
/// `None` until the insert lands.
#[derive(Debug, Default)]
pub struct WalletRegistry {
    map: HashMap<String, Wallet>,
}

impl WalletRegistry {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Insert a wallet. Returns `false` when the address is already present;
    /// the first registration wins and the duplicate is dropped.
    pub fn insert(&mut self, wallet: Wallet) -> bool {
        if self.map.contains_key(&wallet.address) {
            debug!("REGISTRY - duplicate insert for {} ignored", wallet.address);
            return false;
        }
        self.map.insert(wallet.address.clone(), wallet);
        true
    }

    pub fn get(&self, address: &str) -> Option<&Wallet> {
        self.map.get(address)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.map.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Read-only iterator over all registered wallets.
    pub fn iter(&self) -> impl Iterator<Item = &Wallet> {
        self.map.values()
    }

    /// Full snapshot of the registry, for export and audit.
    pub fn export(&self) -> Vec<Wallet> {
        self.map.values().cloned().collect()
    }
}
