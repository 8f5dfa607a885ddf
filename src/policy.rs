//! Which sources to ask, and in what order, for a given identifier.

use std::collections::HashMap;

use crate::identifier::{canonical, same_asset};
use crate::source::SourceSlot;

#[derive(Clone, Debug)]
pub struct SourcePolicy {
    default_chain: Vec<SourceSlot>,
    base_asset: String,
    base_chain: Vec<SourceSlot>,
    overrides: HashMap<String, Vec<SourceSlot>>,
}

impl SourcePolicy {
    pub fn new(default_chain: Vec<SourceSlot>) -> Self {
        Self {
            default_chain,
            base_asset: String::new(),
            base_chain: vec![],
            overrides: HashMap::new(),
        }
    }

    /// Gives the network's native asset its own chain.
    pub fn with_base_asset(mut self, identifier: &str, chain: Vec<SourceSlot>) -> Self {
        self.base_asset = identifier.to_owned();
        self.base_chain = chain;
        self
    }

    pub fn with_override(mut self, identifier: &str, chain: Vec<SourceSlot>) -> Self {
        self.overrides.insert(canonical(identifier), chain);
        self
    }

    pub fn base_asset(&self) -> &str {
        &self.base_asset
    }

    /// Overrides win over the base-asset chain, which wins over the default.
    pub fn chain_for(&self, identifier: &str) -> &[SourceSlot] {
        if let Some(chain) = self.overrides.get(&canonical(identifier)) {
            return chain;
        }
        if !self.base_asset.is_empty() && same_asset(identifier, &self.base_asset) {
            return &self.base_chain;
        }
        &self.default_chain
    }
}
