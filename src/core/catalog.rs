//! Shared model catalog.
//!
//! The catalog is loaded from the embedded `builtin_models.toml` and shared
//! across the application. Policy sync flips tier availability and may
//! replace the default greeting; consumers read it when listing models or
//! opening a fresh conversation.

use crate::core::quota::Tier;
use serde::Deserialize;
use std::sync::{Mutex, MutexGuard};

/// Greeting shown at the top of a fresh conversation unless the server
/// overrides it.
pub const DEFAULT_GREETING: &str = "Hello! How can I assist you today?";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEntry {
    pub id: String,
    pub display_name: String,
    pub tier: Tier,
    pub available: bool,
}

#[derive(Debug, Deserialize)]
struct BuiltinModel {
    id: String,
    display_name: String,
    tier: String,
}

#[derive(Debug, Deserialize)]
struct BuiltinModelsConfig {
    models: Vec<BuiltinModel>,
}

/// Process-wide model list with per-entry availability.
pub struct ModelCatalog {
    entries: Mutex<Vec<ModelEntry>>,
    greeting: Mutex<String>,
}

impl ModelCatalog {
    /// Load the catalog embedded in the binary. All models start available.
    pub fn builtin() -> Self {
        const CONFIG_CONTENT: &str = include_str!("../builtin_models.toml");

        let config: BuiltinModelsConfig =
            toml::from_str(CONFIG_CONTENT).expect("Failed to parse builtin_models.toml");
        let entries = config
            .models
            .into_iter()
            .map(|model| ModelEntry {
                tier: model
                    .tier
                    .parse()
                    .expect("Unknown tier in builtin_models.toml"),
                id: model.id,
                display_name: model.display_name,
                available: true,
            })
            .collect();

        Self {
            entries: Mutex::new(entries),
            greeting: Mutex::new(DEFAULT_GREETING.to_string()),
        }
    }

    pub fn models(&self) -> Vec<ModelEntry> {
        self.lock_entries().clone()
    }

    /// Availability of a model by id (case-insensitive). Unknown models
    /// are reported unavailable.
    pub fn is_available(&self, id: &str) -> bool {
        self.lock_entries()
            .iter()
            .any(|entry| entry.available && entry.id.eq_ignore_ascii_case(id))
    }

    /// Flip availability for every model in `tier`.
    pub fn set_tier_available(&self, tier: Tier, available: bool) {
        for entry in self.lock_entries().iter_mut() {
            if entry.tier == tier {
                entry.available = available;
            }
        }
    }

    pub fn greeting(&self) -> String {
        match self.greeting.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set_greeting(&self, text: &str) {
        match self.greeting.lock() {
            Ok(mut guard) => *guard = text.to_string(),
            Err(poisoned) => *poisoned.into_inner() = text.to_string(),
        }
    }

    fn lock_entries(&self) -> MutexGuard<'_, Vec<ModelEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
