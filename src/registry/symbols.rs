//! Symbol resolution.
//!
//! Symbols identify the graphical glyph attached to a component kind; the
//! core never renders them. Resolution is tiered by confidence:
//!
//! - exact catalogue match → 1.0
//! - `Custom`-prefix strip (`CustomTank` → `Tank`) → 0.95
//! - similarity-ranked best match (normalized Levenshtein) → < 0.95
//!
//! A resolver refuses any match below its `min_confidence`; the default of
//! 1.0 means approximation requires an explicit opt-in.

use smol_str::SmolStr;
use thiserror::Error;

use super::kind::Category;
use super::{ComponentKind, Registry, RegistryError};
use crate::base::fnv1a;

/// Scale applied to the similarity tier so it always ranks below the
/// custom-prefix tier.
const SIMILARITY_SCALE: f64 = 0.9;

#[derive(Debug, Error)]
pub enum SymbolError {
    #[error("no symbol candidate for `{name}`")]
    NoCandidate { name: String },

    #[error(
        "best symbol match for `{name}` is {class_name} at confidence {confidence:.2}, below threshold {threshold:.2}"
    )]
    BelowConfidence {
        name: String,
        class_name: String,
        confidence: f64,
        threshold: f64,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// A resolved symbol with its confidence score.
#[derive(Clone, Debug, PartialEq)]
pub struct SymbolMatch {
    pub kind: ComponentKind,
    pub symbol_id: SmolStr,
    pub confidence: f64,
}

/// Deterministic placeholder symbol for kinds outside the known map:
/// `<prefix><hash4>Z`, the trailing `Z` marking "placeholder".
pub fn placeholder_symbol(category: Category, class_name: &str) -> SmolStr {
    let hash = fnv1a(class_name);
    SmolStr::new(format!("{}{:04X}Z", category.id_prefix(), (hash >> 48) as u16))
}

/// Data-driven symbol resolver over the registry catalogue.
pub struct SymbolResolver<'r> {
    registry: &'r Registry,
    min_confidence: f64,
}

impl<'r> SymbolResolver<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry, min_confidence: 1.0 }
    }

    /// Opt in to approximate matches down to `threshold`.
    pub fn with_min_confidence(mut self, threshold: f64) -> Self {
        self.min_confidence = threshold;
        self
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    /// Resolve a class name (possibly unknown to the catalogue) to a symbol.
    pub fn resolve(&self, name: &str) -> Result<SymbolMatch, SymbolError> {
        // Tier 1: exact.
        if let Ok(kind) = self.registry.resolve(name) {
            let symbol_id = self.registry.symbol_id(&kind)?;
            return Ok(SymbolMatch { kind, symbol_id, confidence: 1.0 });
        }

        // Tier 2: custom-prefix strip.
        if let Some(base) = name.strip_prefix("Custom") {
            if let Ok(kind) = self.registry.resolve(base) {
                let symbol_id = self.registry.symbol_id(&kind)?;
                return self.accept(name, SymbolMatch { kind, symbol_id, confidence: 0.95 });
            }
        }

        // Tier 3: similarity-ranked.
        let mut best: Option<(f64, ComponentKind)> = None;
        for def in self.registry.list_all() {
            let score = strsim::normalized_levenshtein(name, &def.class_name) * SIMILARITY_SCALE;
            if best.as_ref().is_none_or(|(b, _)| score > *b) {
                best = Some((score, def.kind()));
            }
        }
        let (confidence, kind) =
            best.ok_or_else(|| SymbolError::NoCandidate { name: name.to_string() })?;
        let symbol_id = self.registry.symbol_id(&kind)?;
        self.accept(name, SymbolMatch { kind, symbol_id, confidence })
    }

    fn accept(&self, name: &str, m: SymbolMatch) -> Result<SymbolMatch, SymbolError> {
        if m.confidence + f64::EPSILON < self.min_confidence {
            tracing::warn!(
                name,
                class_name = m.kind.class_name(),
                confidence = m.confidence,
                threshold = self.min_confidence,
                "symbol match below confidence threshold"
            );
            return Err(SymbolError::BelowConfidence {
                name: name.to_string(),
                class_name: m.kind.class_name().to_string(),
                confidence: m.confidence,
                threshold: self.min_confidence,
            });
        }
        Ok(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::load().unwrap()
    }

    #[test]
    fn exact_match_is_full_confidence() {
        let r = registry();
        let resolver = SymbolResolver::new(&r);
        let m = resolver.resolve("CentrifugalPump").unwrap();
        assert_eq!(m.confidence, 1.0);
        assert_eq!(m.symbol_id, "PMP001A");
    }

    #[test]
    fn default_threshold_refuses_approximation() {
        let r = registry();
        let resolver = SymbolResolver::new(&r);
        let err = resolver.resolve("CentrifugalPumpX").unwrap_err();
        assert!(matches!(err, SymbolError::BelowConfidence { .. }));
    }

    #[test]
    fn custom_prefix_strips_at_ninety_five() {
        let r = registry();
        let resolver = SymbolResolver::new(&r).with_min_confidence(0.9);
        let m = resolver.resolve("CustomTank").unwrap();
        assert_eq!(m.kind.class_name(), "Tank");
        assert_eq!(m.confidence, 0.95);
    }

    #[test]
    fn similarity_tier_ranks_below_custom_strip() {
        let r = registry();
        let resolver = SymbolResolver::new(&r).with_min_confidence(0.5);
        let m = resolver.resolve("CentrifugalPummp").unwrap();
        assert_eq!(m.kind.class_name(), "CentrifugalPump");
        assert!(m.confidence < 0.95);
    }

    #[test]
    fn placeholder_is_deterministic_and_marked() {
        let a = placeholder_symbol(Category::Custom, "SkidPackage");
        let b = placeholder_symbol(Category::Custom, "SkidPackage");
        assert_eq!(a, b);
        assert!(a.starts_with("CST"));
        assert!(a.ends_with('Z'));
        assert_eq!(a.len(), 8);
    }
}
