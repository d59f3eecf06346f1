//! Catalogue-wide registry invariants.

use plantgraph::registry::{Category, Discipline, Registry, SymbolResolver};
use rstest::rstest;

fn registry() -> Registry {
    Registry::load().unwrap()
}

#[test]
fn catalogue_counts_match_the_published_split() {
    let r = registry();
    let count = |d: Discipline| r.list_all().filter(|def| def.discipline() == d).count();
    assert_eq!(count(Discipline::Equipment), 159);
    assert_eq!(count(Discipline::Piping), 79);
    assert_eq!(count(Discipline::Instrumentation), 34);
    assert_eq!(r.list_all().count(), 272);
}

#[test]
fn every_alias_and_class_resolve_to_the_same_kind() {
    let r = registry();
    for def in r.list_all() {
        let by_alias = r.resolve(&def.sfiles_alias).unwrap();
        let by_class = r.resolve(&def.class_name).unwrap();
        assert_eq!(by_alias, by_class, "{}", def.class_name);
    }
}

#[test]
fn every_family_has_exactly_one_primary_listed_first() {
    let r = registry();
    for def in r.list_all() {
        let family = r.family(&def.sfiles_alias).unwrap();
        assert!(!family.is_empty());
        let primaries = family
            .iter()
            .filter(|k| r.def(k).unwrap().is_primary)
            .count();
        assert_eq!(primaries, 1, "family of {}", def.class_name);
        assert!(r.def(&family[0]).unwrap().is_primary, "family of {}", def.class_name);
    }
}

#[test]
fn bare_family_aliases_resolve_to_primaries_only() {
    let r = registry();
    for def in r.list_all() {
        if let Some(family) = &def.family {
            let resolved = r.resolve(family).unwrap();
            assert!(
                r.def(&resolved).unwrap().is_primary,
                "alias {family} must resolve to a primary"
            );
        }
    }
}

#[test]
fn every_kind_has_a_symbol_and_prefix() {
    let r = registry();
    for def in r.list_all() {
        let kind = def.kind();
        let symbol = r.symbol_id(&kind).unwrap();
        assert!(symbol.len() >= 4, "symbol of {}", def.class_name);
        let prefix = r.id_prefix(&kind).unwrap();
        assert_eq!(prefix.len(), 3, "prefix of {}", def.class_name);
        assert!(prefix.chars().all(|c| c.is_ascii_uppercase()));
        // Placeholders are marked with a trailing Z and derived from the
        // category prefix.
        if def.symbol_id.is_none() {
            assert!(symbol.ends_with('Z'), "{} placeholder", def.class_name);
            assert!(symbol.starts_with(def.category.id_prefix()));
        }
    }
}

#[test]
fn categories_belong_to_their_disciplines() {
    let r = registry();
    for def in r.list_all() {
        assert_eq!(def.category.discipline(), def.discipline());
    }
    assert!(!r.by_category(Category::ControlLoop).is_empty());
    assert!(!r.by_category(Category::OtherInstrumentation).is_empty());
}

#[rstest]
#[case("pump", "CentrifugalPump", "PMP")]
#[case("tank", "Tank", "TNK")]
#[case("valve", "BallValve", "VLV")]
#[case("compressor", "CentrifugalCompressor", "CMP")]
#[case("column", "DistillationColumn", "COL")]
#[case("hex", "ShellTubeHeatExchanger", "HEX")]
fn primary_resolution_and_prefixes(
    #[case] alias: &str,
    #[case] class_name: &str,
    #[case] prefix: &str,
) {
    let r = registry();
    let kind = r.resolve(alias).unwrap();
    assert_eq!(kind.class_name(), class_name);
    assert_eq!(r.id_prefix(&kind).unwrap(), prefix);
}

#[test]
fn describe_exposes_aliases_and_ports() {
    let r = registry();
    let info = r.describe(&r.resolve("control_valve").unwrap()).unwrap();
    assert_eq!(info.class_name, "GlobeControlValve");
    assert_eq!(info.category, Category::Valve);
    assert_eq!(info.default_port_count, 2);
    assert!(info.all_aliases.contains(&"control_valve".into()));
}

#[test]
fn fuzzy_resolution_tiers_are_ordered() {
    let r = registry();
    let resolver = SymbolResolver::new(&r).with_min_confidence(0.5);

    let exact = resolver.resolve("BallValve").unwrap();
    assert_eq!(exact.confidence, 1.0);

    let custom = resolver.resolve("CustomBallValve").unwrap();
    assert_eq!(custom.confidence, 0.95);
    assert_eq!(custom.kind.class_name(), "BallValve");

    let fuzzy = resolver.resolve("BallVlave").unwrap();
    assert!(fuzzy.confidence < custom.confidence);
    assert_eq!(fuzzy.kind.class_name(), "BallValve");
}
