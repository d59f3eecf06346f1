//! Component Registry: the single source of truth for the closed set of
//! component kinds, their aliases, family groupings, categories, default
//! port counts, and graphical symbol identifiers.
//!
//! The catalogue is data-driven: three tabular resources are embedded at
//! compile time and parsed once at startup. The registry is immutable after
//! load and never reads back from models.

mod kind;
mod loader;
mod symbols;

pub use kind::{Category, ComponentKind, Discipline, KindDef, KindInfo};
pub use symbols::{SymbolError, SymbolMatch, SymbolResolver, placeholder_symbol};

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use thiserror::Error;

/// Registry construction and lookup failures.
///
/// Construction failures are fatal by contract; lookup failures are typed
/// not-found errors the caller decides how to surface.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("catalogue resource missing or empty: {resource}")]
    MissingResource { resource: &'static str },

    #[error("malformed catalogue row ({resource}:{line}): {reason}")]
    MalformedRow {
        resource: &'static str,
        line: usize,
        reason: String,
    },

    #[error("duplicate class name in catalogue: {class_name}")]
    DuplicateClass { class_name: String },

    #[error("alias `{alias}` maps to both {first} and {second}")]
    AmbiguousAlias {
        alias: String,
        first: String,
        second: String,
    },

    #[error("family `{family}` has no primary kind")]
    FamilyWithoutPrimary { family: String },

    #[error("family `{family}` has more than one primary kind")]
    FamilyMultiplePrimaries { family: String },

    #[error("catalogue loaded empty")]
    EmptyCatalogue,

    #[error("unknown component kind: {name}")]
    UnknownKind { name: String },
}

impl RegistryError {
    /// The wire code this failure maps to. Construction failures are fatal
    /// before any wire surface exists; they map to the validation code.
    pub fn code(&self) -> crate::base::ErrorCode {
        match self {
            Self::UnknownKind { .. } => crate::base::ErrorCode::UnknownKind,
            _ => crate::base::ErrorCode::ValidationFailed,
        }
    }
}

/// The immutable component catalogue.
pub struct Registry {
    /// Catalogue order: equipment, piping, instrumentation; file order within.
    kinds: IndexMap<SmolStr, KindDef>,
    /// Alias → class name. Bare family aliases map to the family primary.
    aliases: FxHashMap<SmolStr, SmolStr>,
    /// Family alias → member class names, primary first.
    families: IndexMap<SmolStr, Vec<SmolStr>>,
    by_category: FxHashMap<Category, Vec<SmolStr>>,
}

impl Registry {
    /// Load the embedded catalogue. Any inconsistency is fatal.
    pub fn load() -> Result<Self, RegistryError> {
        let kinds = loader::load_catalogue()?;

        let mut aliases: FxHashMap<SmolStr, SmolStr> = FxHashMap::default();
        let mut families: IndexMap<SmolStr, Vec<SmolStr>> = IndexMap::new();
        let mut by_category: FxHashMap<Category, Vec<SmolStr>> = FxHashMap::default();

        for def in kinds.values() {
            if let Some(existing) = aliases.insert(def.sfiles_alias.clone(), def.class_name.clone())
            {
                return Err(RegistryError::AmbiguousAlias {
                    alias: def.sfiles_alias.to_string(),
                    first: existing.to_string(),
                    second: def.class_name.to_string(),
                });
            }
            if let Some(family) = &def.family {
                families.entry(family.clone()).or_default().push(def.class_name.clone());
            }
            by_category.entry(def.category).or_default().push(def.class_name.clone());
        }

        // Families: exactly one primary, listed first; the bare family alias
        // must resolve to the primary.
        for (family, members) in families.iter_mut() {
            let primaries: Vec<usize> = members
                .iter()
                .enumerate()
                .filter(|(_, m)| kinds[*m].is_primary)
                .map(|(i, _)| i)
                .collect();
            match primaries.as_slice() {
                [] => {
                    return Err(RegistryError::FamilyWithoutPrimary { family: family.to_string() });
                }
                [first] => members.swap(0, *first),
                _ => {
                    return Err(RegistryError::FamilyMultiplePrimaries {
                        family: family.to_string(),
                    });
                }
            }
            let primary = &members[0];
            match aliases.get(family) {
                Some(target) if target == primary => {}
                Some(target) => {
                    return Err(RegistryError::AmbiguousAlias {
                        alias: family.to_string(),
                        first: target.to_string(),
                        second: primary.to_string(),
                    });
                }
                None => {
                    aliases.insert(family.clone(), primary.clone());
                }
            }
        }

        tracing::info!(
            kinds = kinds.len(),
            aliases = aliases.len(),
            families = families.len(),
            "component registry loaded"
        );
        Ok(Self { kinds, aliases, families, by_category })
    }

    // ── Lookup ──────────────────────────────────────────────────────

    /// Resolve a lowercase alias or canonical class name to a kind.
    pub fn resolve(&self, name: &str) -> Result<ComponentKind, RegistryError> {
        if let Some(def) = self.kinds.get(name) {
            return Ok(def.kind());
        }
        if let Some(class) = self.aliases.get(name) {
            return Ok(ComponentKind(class.clone()));
        }
        Err(RegistryError::UnknownKind { name: name.to_string() })
    }

    /// The catalogue row for a kind handle.
    pub fn def(&self, kind: &ComponentKind) -> Result<&KindDef, RegistryError> {
        self.kinds
            .get(kind.class_name())
            .ok_or_else(|| RegistryError::UnknownKind { name: kind.class_name().to_string() })
    }

    /// Describe a kind: category, family, primary, ports, symbol, aliases.
    pub fn describe(&self, kind: &ComponentKind) -> Result<KindInfo, RegistryError> {
        let def = self.def(kind)?;
        let primary = def
            .family
            .as_ref()
            .and_then(|f| self.families.get(f))
            .map(|members| members[0].clone());

        let mut all_aliases = vec![def.sfiles_alias.clone()];
        if let Some(family) = &def.family {
            if def.is_primary && family != &def.sfiles_alias {
                all_aliases.push(family.clone());
            }
        }

        Ok(KindInfo {
            class_name: def.class_name.clone(),
            category: def.category,
            discipline: def.discipline(),
            family: def.family.clone(),
            primary,
            default_port_count: def.port_count,
            default_symbol_id: self.symbol_id(kind)?,
            all_aliases,
            display_name: def.display_name.clone(),
        })
    }

    /// The ordered kinds of the family addressed by `alias` (family name,
    /// member alias, or class name). The first entry is the primary. A kind
    /// without a family is its own single-member family.
    pub fn family(&self, alias: &str) -> Result<Vec<ComponentKind>, RegistryError> {
        if let Some(members) = self.families.get(alias) {
            return Ok(members.iter().map(|m| ComponentKind(m.clone())).collect());
        }
        let kind = self.resolve(alias)?;
        let def = self.def(&kind)?;
        match &def.family {
            Some(family) => Ok(self.families[family].iter().map(|m| ComponentKind(m.clone())).collect()),
            None => Ok(vec![kind]),
        }
    }

    /// All kinds in a category, catalogue order.
    pub fn by_category(&self, category: Category) -> Vec<ComponentKind> {
        self.by_category
            .get(&category)
            .map(|v| v.iter().map(|m| ComponentKind(m.clone())).collect())
            .unwrap_or_default()
    }

    /// The full catalogue, in catalogue order.
    pub fn list_all(&self) -> impl Iterator<Item = &KindDef> {
        self.kinds.values()
    }

    // ── Derived properties ──────────────────────────────────────────

    /// The symbol id for a kind: the known map entry, or the deterministic
    /// placeholder `<prefix><hash4>Z` for kinds outside the map.
    pub fn symbol_id(&self, kind: &ComponentKind) -> Result<SmolStr, RegistryError> {
        let def = self.def(kind)?;
        Ok(match &def.symbol_id {
            Some(symbol) => symbol.clone(),
            None => placeholder_symbol(def.category, &def.class_name),
        })
    }

    /// Three-letter prefix for exporter ids: leading letters of the symbol
    /// id, or the category prefix when the symbol is a placeholder.
    pub fn id_prefix(&self, kind: &ComponentKind) -> Result<SmolStr, RegistryError> {
        let def = self.def(kind)?;
        Ok(match &def.symbol_id {
            Some(symbol) => SmolStr::new(&symbol[..3]),
            None => SmolStr::new(def.category.id_prefix()),
        })
    }

    /// The alias under which a kind is emitted to the linear dialect:
    /// its family alias when it has one, its own alias otherwise.
    pub fn family_alias(&self, kind: &ComponentKind) -> Result<SmolStr, RegistryError> {
        let def = self.def(kind)?;
        Ok(def.family.clone().unwrap_or_else(|| def.sfiles_alias.clone()))
    }

    /// The primary kind of the family addressed by `alias`.
    pub fn primary_of(&self, alias: &str) -> Result<ComponentKind, RegistryError> {
        Ok(self.family(alias)?.remove(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::load().expect("embedded catalogue must load")
    }

    #[test]
    fn bare_alias_resolves_to_primary() {
        let r = registry();
        let kind = r.resolve("pump").unwrap();
        assert_eq!(kind.class_name(), "CentrifugalPump");
    }

    #[test]
    fn qualified_alias_resolves_to_variant() {
        let r = registry();
        let kind = r.resolve("pump_reciprocating").unwrap();
        assert_eq!(kind.class_name(), "ReciprocatingPump");
    }

    #[test]
    fn class_name_and_alias_agree() {
        let r = registry();
        for def in r.list_all() {
            let by_class = r.resolve(&def.class_name).unwrap();
            let by_alias = r.resolve(&def.sfiles_alias).unwrap();
            assert_eq!(by_class, by_alias, "alias {}", def.sfiles_alias);
        }
    }

    #[test]
    fn unknown_kind_is_typed() {
        let r = registry();
        assert!(matches!(r.resolve("warp_drive"), Err(RegistryError::UnknownKind { .. })));
    }

    #[test]
    fn family_lists_primary_first() {
        let r = registry();
        let pumps = r.family("pump").unwrap();
        assert_eq!(pumps[0].class_name(), "CentrifugalPump");
        assert!(pumps.iter().any(|k| k.class_name() == "ReciprocatingPump"));
        assert_eq!(pumps.len(), 11);
    }

    #[test]
    fn family_of_variant_matches_family_of_primary() {
        let r = registry();
        assert_eq!(r.family("pump_gear").unwrap(), r.family("pump").unwrap());
    }

    #[test]
    fn singleton_kind_is_its_own_family() {
        let r = registry();
        let family = r.family("flash_drum").unwrap();
        assert_eq!(family.len(), 1);
        assert_eq!(family[0].class_name(), "FlashDrum");
    }

    #[test]
    fn by_category_nonempty_for_all_disciplines() {
        let r = registry();
        assert!(!r.by_category(Category::Rotating).is_empty());
        assert!(!r.by_category(Category::Valve).is_empty());
        assert!(!r.by_category(Category::Sensing).is_empty());
    }

    #[test]
    fn describe_reports_family_and_aliases() {
        let r = registry();
        let kind = r.resolve("pump_reciprocating").unwrap();
        let info = r.describe(&kind).unwrap();
        assert_eq!(info.family.as_deref(), Some("pump"));
        assert_eq!(info.primary.as_deref(), Some("CentrifugalPump"));
        assert_eq!(info.default_port_count, 2);
        assert_eq!(info.all_aliases, vec!["pump_reciprocating"]);
    }

    #[test]
    fn custom_kind_gets_placeholder_symbol() {
        let r = registry();
        let kind = r.resolve("custom_equipment").unwrap();
        let symbol = r.symbol_id(&kind).unwrap();
        assert!(symbol.starts_with("CST"));
        assert!(symbol.ends_with('Z'));
        // Deterministic across calls.
        assert_eq!(symbol, r.symbol_id(&kind).unwrap());
    }

    #[test]
    fn id_prefix_follows_symbol() {
        let r = registry();
        let pump = r.resolve("pump").unwrap();
        assert_eq!(r.id_prefix(&pump).unwrap(), "PMP");
        let tank = r.resolve("tank").unwrap();
        assert_eq!(r.id_prefix(&tank).unwrap(), "TNK");
        let valve = r.resolve("valve").unwrap();
        assert_eq!(r.id_prefix(&valve).unwrap(), "VLV");
    }

    #[test]
    fn resolve_is_pure() {
        let r = registry();
        let first = r.resolve("hex").unwrap();
        let second = r.resolve("hex").unwrap();
        assert_eq!(first, second);
    }
}
