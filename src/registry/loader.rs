//! Catalogue loading from the embedded tabular resources.
//!
//! Three tab-separated resources (equipment, piping, instrumentation) are
//! compiled into the binary. Loading is strict: a malformed row, duplicate
//! class name, duplicate alias, or ill-formed family is a fatal
//! [`RegistryError`] — an empty or partial registry is never acceptable.

use indexmap::IndexMap;
use smol_str::SmolStr;

use super::RegistryError;
use super::kind::{Category, Discipline, KindDef};

const EQUIPMENT: &str = include_str!("data/equipment.tsv");
const PIPING: &str = include_str!("data/piping.tsv");
const INSTRUMENTATION: &str = include_str!("data/instrumentation.tsv");

const HEADER: [&str; 8] = [
    "class_name",
    "sfiles_alias",
    "is_primary",
    "family",
    "category",
    "symbol_id",
    "port_count",
    "display_name",
];

/// Parse all three resources into catalogue order (equipment, piping,
/// instrumentation; file order within each).
pub(super) fn load_catalogue() -> Result<IndexMap<SmolStr, KindDef>, RegistryError> {
    let mut kinds = IndexMap::new();
    for (resource, discipline) in [
        ("equipment", Discipline::Equipment),
        ("piping", Discipline::Piping),
        ("instrumentation", Discipline::Instrumentation),
    ] {
        let content = match resource {
            "equipment" => EQUIPMENT,
            "piping" => PIPING,
            _ => INSTRUMENTATION,
        };
        parse_resource(resource, discipline, content, &mut kinds)?;
    }
    if kinds.is_empty() {
        return Err(RegistryError::EmptyCatalogue);
    }
    Ok(kinds)
}

fn parse_resource(
    resource: &'static str,
    discipline: Discipline,
    content: &str,
    kinds: &mut IndexMap<SmolStr, KindDef>,
) -> Result<(), RegistryError> {
    let mut lines = content.lines().enumerate();

    let (_, header) = lines.next().ok_or(RegistryError::MissingResource { resource })?;
    let header_fields: Vec<&str> = header.split('\t').collect();
    if header_fields != HEADER {
        return Err(RegistryError::MalformedRow {
            resource,
            line: 1,
            reason: format!("unexpected header: {header}"),
        });
    }

    let mut rows = 0usize;
    for (idx, line) in lines {
        if line.is_empty() {
            continue;
        }
        let line_no = idx + 1;
        let def = parse_row(resource, discipline, line_no, line)?;
        if kinds.contains_key(&def.class_name) {
            return Err(RegistryError::DuplicateClass {
                class_name: def.class_name.to_string(),
            });
        }
        kinds.insert(def.class_name.clone(), def);
        rows += 1;
    }

    if rows == 0 {
        return Err(RegistryError::MissingResource { resource });
    }
    tracing::debug!(resource, rows, "catalogue resource loaded");
    Ok(())
}

fn parse_row(
    resource: &'static str,
    discipline: Discipline,
    line: usize,
    text: &str,
) -> Result<KindDef, RegistryError> {
    let malformed = |reason: String| RegistryError::MalformedRow { resource, line, reason };

    let fields: Vec<&str> = text.split('\t').collect();
    if fields.len() != HEADER.len() {
        return Err(malformed(format!("expected {} fields, found {}", HEADER.len(), fields.len())));
    }

    let class_name = fields[0].trim();
    let alias = fields[1].trim();
    if class_name.is_empty() || alias.is_empty() {
        return Err(malformed("class_name and sfiles_alias are required".into()));
    }
    if alias.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(malformed(format!("alias must be lowercase: {alias}")));
    }

    let is_primary = match fields[2].trim() {
        "1" => true,
        "0" => false,
        other => return Err(malformed(format!("is_primary must be 0 or 1, found {other}"))),
    };

    let family = match fields[3].trim() {
        "" => None,
        f => Some(SmolStr::new(f)),
    };

    let category_token = fields[4].trim();
    let category = Category::parse(category_token)
        .ok_or_else(|| malformed(format!("unknown category: {category_token}")))?;
    if category.discipline() != discipline {
        return Err(malformed(format!(
            "category {category_token} does not belong to the {discipline} resource"
        )));
    }

    let symbol_id = match fields[5].trim() {
        "" => None,
        s => Some(SmolStr::new(s)),
    };

    let port_count: usize = fields[6]
        .trim()
        .parse()
        .map_err(|_| malformed(format!("port_count must be an integer: {}", fields[6])))?;

    let display_name = fields[7].trim();
    if display_name.is_empty() {
        return Err(malformed("display_name is required".into()));
    }

    Ok(KindDef {
        class_name: SmolStr::new(class_name),
        sfiles_alias: SmolStr::new(alias),
        is_primary,
        family,
        category,
        symbol_id,
        port_count,
        display_name: SmolStr::new(display_name),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_loads_all_disciplines() {
        let kinds = load_catalogue().expect("embedded catalogue must load");
        let equipment = kinds.values().filter(|d| d.discipline() == Discipline::Equipment).count();
        let piping = kinds.values().filter(|d| d.discipline() == Discipline::Piping).count();
        let instrumentation = kinds
            .values()
            .filter(|d| d.discipline() == Discipline::Instrumentation)
            .count();
        assert_eq!(equipment, 159);
        assert_eq!(piping, 79);
        assert_eq!(instrumentation, 34);
        assert_eq!(kinds.len(), 272);
    }

    #[test]
    fn rejects_wrong_field_count() {
        let mut kinds = IndexMap::new();
        let content = "class_name\tsfiles_alias\tis_primary\tfamily\tcategory\tsymbol_id\tport_count\tdisplay_name\nPumpOnly\tpump";
        let err = parse_resource("equipment", Discipline::Equipment, content, &mut kinds)
            .expect_err("short row must fail");
        assert!(matches!(err, RegistryError::MalformedRow { .. }));
    }

    #[test]
    fn rejects_category_in_wrong_resource() {
        let mut kinds = IndexMap::new();
        let content = "class_name\tsfiles_alias\tis_primary\tfamily\tcategory\tsymbol_id\tport_count\tdisplay_name\nOddOne\todd_one\t1\t\tVALVE\tXXX001A\t2\tOdd One";
        let err = parse_resource("equipment", Discipline::Equipment, content, &mut kinds)
            .expect_err("piping category in equipment resource must fail");
        assert!(matches!(err, RegistryError::MalformedRow { .. }));
    }
}
