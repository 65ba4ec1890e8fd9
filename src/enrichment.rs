//! Optional chemical-identity enrichment of extraction results.
//!
//! The actual compound database lives outside of this crate. It is injected through [`CompoundLookup`]
//! and is always best-effort: a failing lookup is logged and the result is returned without enrichment.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Identity of a compound as returned by a lookup service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundInfo {
    pub name: String,
    /// Identifier in the external compound database.
    #[serde(default)]
    pub compound_id: Option<u64>,
    /// Encoded structure image as delivered by the service.
    #[serde(default)]
    pub image: Option<Vec<u8>>,
    /// Where the structure image can be fetched, for services that only link it.
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("compound lookup unavailable: {0}")]
    Unavailable(String),
    #[error("compound lookup failed: {0}")]
    Failed(String),
}

/// A service that resolves a material name to a compound.
pub trait CompoundLookup: Send + Sync {
    /// `Ok(None)` if the name is not known.
    fn lookup(&self, name: &str) -> Result<Option<CompoundInfo>, LookupError>;
}

/// Lookup backed by a fixed, case-insensitive name table.
#[derive(Debug, Clone, Default)]
pub struct CompoundTable {
    entries: IndexMap<String, CompoundInfo>,
}

impl CompoundTable {
    pub fn new(entries: impl IntoIterator<Item = CompoundInfo>) -> Self {
        CompoundTable {
            entries: entries
                .into_iter()
                .map(|info| (info.name.to_lowercase(), info))
                .collect(),
        }
    }

    /// Loads a JSON array of [`CompoundInfo`] objects.
    pub fn load(path: &Path) -> Result<Self, LookupError> {
        let text =
            std::fs::read_to_string(path).map_err(|e| LookupError::Unavailable(e.to_string()))?;
        let entries: Vec<CompoundInfo> =
            serde_json::from_str(&text).map_err(|e| LookupError::Unavailable(e.to_string()))?;
        Ok(CompoundTable::new(entries))
    }
}

impl CompoundLookup for CompoundTable {
    fn lookup(&self, name: &str) -> Result<Option<CompoundInfo>, LookupError> {
        Ok(self.entries.get(&name.trim().to_lowercase()).cloned())
    }
}
