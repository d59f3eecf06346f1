//! The exporter's ID registry.
//!
//! Every exported element gets a unique string id under a category-derived
//! three-letter prefix (`PMP0001`, `TNK0001`, `VLV0001`), counted per
//! prefix. `reserve` pre-seeds an id without binding it to an object, for
//! round-tripping imported documents. `validate_reference` is the
//! referential-integrity gate: any cross-reference attribute must point to
//! a previously registered id.

use indexmap::IndexSet;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use super::ExportError;

#[derive(Debug, Default)]
pub struct IdRegistry {
    /// Every registered id, in registration order.
    registered: IndexSet<SmolStr>,
    /// Source key (model-internal id) → exported id.
    by_source: FxHashMap<SmolStr, SmolStr>,
    counters: FxHashMap<SmolStr, u32>,
}

impl IdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalise any identifier (UUIDs included) to its string form.
    pub fn normalize(id: impl std::fmt::Display) -> SmolStr {
        SmolStr::new(id.to_string())
    }

    /// Assign the next free id under `prefix` and bind it to `source`.
    pub fn assign(&mut self, source: &str, prefix: &str) -> SmolStr {
        if let Some(existing) = self.by_source.get(source) {
            return existing.clone();
        }
        let counter = self.counters.entry(SmolStr::new(prefix)).or_insert(0);
        let id = loop {
            *counter += 1;
            let candidate = SmolStr::new(format!("{prefix}{:04}", *counter));
            if !self.registered.contains(&candidate) {
                break candidate;
            }
        };
        self.registered.insert(id.clone());
        self.by_source.insert(SmolStr::new(source), id.clone());
        id
    }

    /// Bind an exact id to a source (sensor tags double as ids).
    pub fn assign_fixed(&mut self, source: &str, id: &str) -> Result<SmolStr, ExportError> {
        let id = SmolStr::new(id);
        if let Some(existing) = self.by_source.get(source) {
            if existing == &id {
                return Ok(id);
            }
            return Err(ExportError::DuplicateId { id: id.to_string() });
        }
        // A reserved id may be claimed once; a bound one may not.
        if self.registered.contains(&id) && self.by_source.values().any(|v| v == &id) {
            return Err(ExportError::DuplicateId { id: id.to_string() });
        }
        self.registered.insert(id.clone());
        self.by_source.insert(SmolStr::new(source), id.clone());
        Ok(id)
    }

    /// Pre-seed an id without binding it to an object. Counters skip over
    /// reserved ids, so imported documents round-trip without collisions.
    pub fn reserve(&mut self, id: &str) {
        self.registered.insert(SmolStr::new(id));
    }

    /// The exported id bound to a source key.
    pub fn lookup(&self, source: &str) -> Option<&SmolStr> {
        self.by_source.get(source)
    }

    /// Assert that a cross-reference points to a previously registered id.
    pub fn validate_reference(&self, id: &str, context: &str) -> Result<(), ExportError> {
        if self.registered.contains(id) {
            Ok(())
        } else {
            Err(ExportError::ReferenceUndefined {
                id: id.to_string(),
                context: context.to_string(),
            })
        }
    }
}
