//! Block template library.
//!
//! Block kinds (power blocks, solids handling, utility units, dosing skids)
//! expand to multi-component sub-graphs. Templates are data: a built-in set
//! is embedded as JSON and callers may register more before conversion.
//!
//! Parameter substitution is `${name}` / `${name|default}`; a reference to a
//! parameter with neither an argument nor a default is an error. Conditions
//! on components and streams go through the restricted grammar in
//! [`super::condition`]. Streams touching a condition-dropped component are
//! dropped with it; a boundary port on a dropped component is an error.

use indexmap::IndexMap;
use serde::Deserialize;
use smol_str::SmolStr;

use super::ConvertError;
use super::condition;

const BUILTIN: &str = include_str!("templates.json");

/// A template parameter with an optional default.
#[derive(Clone, Debug, Deserialize)]
pub struct TemplateParam {
    pub name: SmolStr,
    #[serde(default)]
    pub default: Option<String>,
}

/// A component slot inside a template.
#[derive(Clone, Debug, Deserialize)]
pub struct TemplateComponent {
    /// Slot name, referenced by streams and boundaries.
    pub name: SmolStr,
    /// Registry alias or class name.
    pub kind: SmolStr,
    /// Tag pattern, substituted per instantiation.
    pub tag: String,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub attributes: IndexMap<SmolStr, serde_json::Value>,
}

/// An internal stream between two slots.
#[derive(Clone, Debug, Deserialize)]
pub struct TemplateStream {
    pub from: SmolStr,
    pub to: SmolStr,
    #[serde(default)]
    pub condition: Option<String>,
}

/// A boundary port: where the surrounding flowsheet splices in.
#[derive(Clone, Debug, Deserialize)]
pub struct TemplateBoundary {
    pub component: SmolStr,
    /// 1-based, as all externally visible port numbers are.
    pub port: usize,
}

/// One block template.
#[derive(Clone, Debug, Deserialize)]
pub struct BlockTemplate {
    pub name: SmolStr,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Vec<TemplateParam>,
    pub components: Vec<TemplateComponent>,
    #[serde(default)]
    pub streams: Vec<TemplateStream>,
    pub inlets: Vec<TemplateBoundary>,
    pub outlets: Vec<TemplateBoundary>,
}

#[derive(Deserialize)]
struct TemplateFile {
    templates: Vec<BlockTemplate>,
}

/// A fully-substituted, condition-filtered template ready to splice.
#[derive(Clone, Debug)]
pub struct TemplateInstance {
    pub components: Vec<InstanceComponent>,
    /// (from slot, to slot)
    pub streams: Vec<(SmolStr, SmolStr)>,
    /// (slot, 0-based port)
    pub inlets: Vec<(SmolStr, usize)>,
    pub outlets: Vec<(SmolStr, usize)>,
}

#[derive(Clone, Debug)]
pub struct InstanceComponent {
    pub slot: SmolStr,
    pub kind: SmolStr,
    pub tag: String,
    pub attributes: IndexMap<SmolStr, serde_json::Value>,
}

/// The template library.
pub struct TemplateLibrary {
    templates: IndexMap<SmolStr, BlockTemplate>,
}

impl TemplateLibrary {
    /// Load the embedded built-in templates. A malformed built-in set is a
    /// startup-fatal error.
    pub fn builtin() -> Result<Self, ConvertError> {
        let file: TemplateFile = serde_json::from_str(BUILTIN).map_err(|e| {
            ConvertError::Template {
                template: SmolStr::new("<builtin>"),
                reason: e.to_string(),
            }
        })?;
        let mut library = Self { templates: IndexMap::new() };
        for template in file.templates {
            library.register(template)?;
        }
        tracing::debug!(templates = library.templates.len(), "template library loaded");
        Ok(library)
    }

    /// Register a template; duplicate names are an error.
    pub fn register(&mut self, template: BlockTemplate) -> Result<(), ConvertError> {
        let name = template.name.clone();
        if self.templates.insert(name.clone(), template).is_some() {
            return Err(ConvertError::Template {
                template: name,
                reason: "template registered twice".into(),
            });
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&BlockTemplate, ConvertError> {
        self.templates
            .get(name)
            .ok_or_else(|| ConvertError::TemplateNotFound { name: name.to_string() })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &SmolStr> {
        self.templates.keys()
    }

    /// Substitute parameters, evaluate conditions, and produce a spliceable
    /// instance.
    pub fn instantiate(
        &self,
        name: &str,
        args: &IndexMap<SmolStr, String>,
    ) -> Result<TemplateInstance, ConvertError> {
        let template = self.get(name)?;

        // Declared defaults first, caller arguments on top.
        let mut values: IndexMap<SmolStr, String> = template
            .parameters
            .iter()
            .filter_map(|p| p.default.as_ref().map(|d| (p.name.clone(), d.clone())))
            .collect();
        for (key, value) in args {
            values.insert(key.clone(), value.clone());
        }

        let mut components = Vec::new();
        let mut kept: Vec<&SmolStr> = Vec::new();
        for component in &template.components {
            if let Some(raw) = &component.condition {
                let substituted = substitute(&template.name, raw, &values)?;
                if !condition::evaluate(&substituted).map_err(ConvertError::Condition)? {
                    continue;
                }
            }
            kept.push(&component.name);
            components.push(InstanceComponent {
                slot: component.name.clone(),
                kind: component.kind.clone(),
                tag: substitute(&template.name, &component.tag, &values)?,
                attributes: component.attributes.clone(),
            });
        }

        let mut streams = Vec::new();
        for stream in &template.streams {
            if let Some(raw) = &stream.condition {
                let substituted = substitute(&template.name, raw, &values)?;
                if !condition::evaluate(&substituted).map_err(ConvertError::Condition)? {
                    continue;
                }
            }
            // Streams follow their endpoints: dropped component, dropped stream.
            if !kept.contains(&&stream.from) || !kept.contains(&&stream.to) {
                continue;
            }
            streams.push((stream.from.clone(), stream.to.clone()));
        }

        let boundary = |bounds: &[TemplateBoundary]| -> Result<Vec<(SmolStr, usize)>, ConvertError> {
            bounds
                .iter()
                .map(|b| {
                    if !kept.contains(&&b.component) {
                        return Err(ConvertError::Template {
                            template: template.name.clone(),
                            reason: format!("boundary references dropped slot `{}`", b.component),
                        });
                    }
                    if b.port == 0 {
                        return Err(ConvertError::Template {
                            template: template.name.clone(),
                            reason: format!("boundary port on `{}` is 1-based", b.component),
                        });
                    }
                    Ok((b.component.clone(), b.port - 1))
                })
                .collect()
        };

        Ok(TemplateInstance {
            components,
            streams,
            inlets: boundary(&template.inlets)?,
            outlets: boundary(&template.outlets)?,
        })
    }
}

/// Expand `${name}` / `${name|default}` references in a pattern.
fn substitute(
    template: &SmolStr,
    pattern: &str,
    values: &IndexMap<SmolStr, String>,
) -> Result<String, ConvertError> {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| ConvertError::Template {
            template: template.clone(),
            reason: format!("unterminated `${{` in `{pattern}`"),
        })?;
        let reference = &after[..end];
        let (name, inline_default) = match reference.split_once('|') {
            Some((n, d)) => (n, Some(d)),
            None => (reference, None),
        };
        match values.get(name).map(String::as_str).or(inline_default) {
            Some(value) => out.push_str(value),
            None => {
                return Err(ConvertError::Template {
                    template: template.clone(),
                    reason: format!("parameter `{name}` has no value and no default"),
                });
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, &str)]) -> IndexMap<SmolStr, String> {
        pairs
            .iter()
            .map(|(k, v)| (SmolStr::new(k), v.to_string()))
            .collect()
    }

    #[test]
    fn builtin_templates_load() {
        let library = TemplateLibrary::builtin().unwrap();
        for name in ["power_block", "solids_handling", "utility_unit", "chemical_dosing"] {
            assert!(library.contains(name), "missing builtin {name}");
        }
    }

    #[test]
    fn unknown_template_is_typed() {
        let library = TemplateLibrary::builtin().unwrap();
        assert!(matches!(
            library.get("fusion_island"),
            Err(ConvertError::TemplateNotFound { .. })
        ));
    }

    #[test]
    fn defaults_apply_and_conditions_keep_components() {
        let library = TemplateLibrary::builtin().unwrap();
        let instance = library.instantiate("power_block", &args(&[])).unwrap();
        // Default condensate=recycle keeps the pump.
        assert_eq!(instance.components.len(), 4);
        assert!(instance.components.iter().any(|c| c.tag == "PB-PMP"));
        assert_eq!(instance.streams.len(), 3);
    }

    #[test]
    fn failing_condition_drops_component_and_streams() {
        let library = TemplateLibrary::builtin().unwrap();
        let instance = library
            .instantiate("power_block", &args(&[("condensate", "discard")]))
            .unwrap();
        assert_eq!(instance.components.len(), 3);
        assert_eq!(instance.streams.len(), 2);
    }

    #[test]
    fn alternative_stream_takes_over_without_strainer() {
        let library = TemplateLibrary::builtin().unwrap();
        let with = library.instantiate("utility_unit", &args(&[])).unwrap();
        assert!(with.streams.contains(&(SmolStr::new("break_tank"), SmolStr::new("suction_strainer"))));

        let without = library
            .instantiate("utility_unit", &args(&[("strainer", "no")]))
            .unwrap();
        assert!(without.streams.contains(&(SmolStr::new("break_tank"), SmolStr::new("pump"))));
        assert_eq!(without.components.len(), 3);
    }

    #[test]
    fn missing_parameter_without_default_is_an_error() {
        let mut library = TemplateLibrary::builtin().unwrap();
        library
            .register(BlockTemplate {
                name: SmolStr::new("strict"),
                description: None,
                parameters: vec![TemplateParam { name: SmolStr::new("duty"), default: None }],
                components: vec![TemplateComponent {
                    name: SmolStr::new("only"),
                    kind: SmolStr::new("tank"),
                    tag: "${duty}-TNK".into(),
                    condition: None,
                    attributes: IndexMap::new(),
                }],
                streams: vec![],
                inlets: vec![TemplateBoundary { component: SmolStr::new("only"), port: 1 }],
                outlets: vec![TemplateBoundary { component: SmolStr::new("only"), port: 2 }],
            })
            .unwrap();
        let err = library.instantiate("strict", &args(&[])).unwrap_err();
        assert!(matches!(err, ConvertError::Template { .. }));
    }

    #[test]
    fn inline_default_fills_in() {
        let template = SmolStr::new("t");
        let values = IndexMap::new();
        assert_eq!(substitute(&template, "${x|fallback}-A", &values).unwrap(), "fallback-A");
    }
}
