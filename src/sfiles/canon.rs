//! Canonical string emission for the linear dialect.
//!
//! The canonical form is a pure function of topology: unit declarations in
//! depth-first flow order starting from the lexicographically least
//! zero-in-degree unit, branches ordered by (target name, first tag),
//! controls and tags sorted. Reparsing a canonical string yields an
//! isomorphic model.

use std::collections::BTreeSet;
use std::fmt::Write;

use smol_str::SmolStr;

use crate::model::{LinearModel, Stream};

/// Emit the canonical encoding of a linear model.
pub fn canonical(model: &LinearModel) -> String {
    let mut emitter = Emitter {
        model,
        out: String::new(),
        visited: BTreeSet::new(),
    };

    // Chains start at zero-in-degree units; cyclic leftovers start at the
    // least unvisited unit.
    let mut starts: Vec<&SmolStr> = model
        .units
        .keys()
        .filter(|u| model.in_degree(u) == 0)
        .collect();
    starts.sort();

    let mut first = true;
    for start in starts {
        if emitter.visited.contains(start.as_str()) {
            continue;
        }
        emitter.separator(&mut first);
        emitter.emit_unit(start);
    }
    loop {
        let mut remaining: Vec<&SmolStr> = model
            .units
            .keys()
            .filter(|u| !emitter.visited.contains(u.as_str()))
            .collect();
        remaining.sort();
        match remaining.first() {
            Some(start) => {
                emitter.separator(&mut first);
                emitter.emit_unit(start);
            }
            None => break,
        }
    }

    emitter.out
}

struct Emitter<'m> {
    model: &'m LinearModel,
    out: String,
    visited: BTreeSet<String>,
}

impl<'m> Emitter<'m> {
    fn separator(&mut self, first: &mut bool) {
        if !*first {
            self.out.push(';');
        }
        *first = false;
    }

    /// Sorted outgoing streams of a unit: (target name, first tag).
    fn ordered_outgoing(&self, unit: &str) -> Vec<&'m Stream> {
        let mut streams: Vec<&Stream> = self.model.outgoing(unit).collect();
        streams.sort_by(|a, b| {
            (&a.to, a.tags.first()).cmp(&(&b.to, b.tags.first()))
        });
        streams
    }

    fn emit_unit(&mut self, name: &str) {
        if self.visited.contains(name) {
            // Back-reference: bare name, recursion stops here.
            self.out.push_str(name);
            return;
        }
        self.visited.insert(name.to_string());

        let unit = &self.model.units[name];
        let _ = write!(self.out, "{}[{}]", unit.name, unit.kind);

        let mut controls: Vec<&SmolStr> = self
            .model
            .controls
            .iter()
            .filter(|c| c.unit == name)
            .map(|c| &c.kind)
            .collect();
        controls.sort();
        for control in controls {
            let _ = write!(self.out, "{{{control}}}");
        }

        let outgoing = self.ordered_outgoing(name);
        match outgoing.len() {
            0 => {}
            1 => {
                self.emit_connector(outgoing[0]);
                self.emit_unit(&outgoing[0].to);
            }
            _ => {
                for stream in outgoing {
                    self.out.push('(');
                    self.emit_connector(stream);
                    self.emit_unit(&stream.to);
                    self.out.push(')');
                }
            }
        }
    }

    fn emit_connector(&mut self, stream: &Stream) {
        self.out.push_str("->");
        if !stream.tags.is_empty() {
            let mut tags: Vec<&SmolStr> = stream.tags.iter().collect();
            tags.sort();
            self.out.push('{');
            for (i, tag) in tags.iter().enumerate() {
                if i > 0 {
                    self.out.push(',');
                }
                self.out.push_str(tag);
            }
            self.out.push('}');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sfiles::parse;

    #[test]
    fn chain_roundtrips_verbatim() {
        let source = "tank[tank]->pump[pump]->heater[heater]";
        let model = parse(source).unwrap();
        assert_eq!(canonical(&model), source);
    }

    #[test]
    fn branches_are_ordered_by_target_name() {
        let model =
            parse("s[separator](->z[heater])(->a[cooler])").unwrap();
        assert_eq!(canonical(&model), "s[separator](->a[cooler])(->z[heater])");
    }

    #[test]
    fn canonicalisation_is_idempotent() {
        let source = "f[tank]->s[separator](->h[heater]->m[mixer])(->c[cooler]->m){LC}";
        let first = canonical(&parse(source).unwrap());
        let second = canonical(&parse(&first).unwrap());
        assert_eq!(first, second);
    }

    #[test]
    fn controls_are_sorted() {
        let model = parse("r[reactor]{TC}{FC}{LC}").unwrap();
        assert_eq!(canonical(&model), "r[reactor]{FC}{LC}{TC}");
    }

    #[test]
    fn cycle_emits_backreference() {
        let source = "a[pump]->b[heater]->a";
        let model = parse(source).unwrap();
        // All units have in-degree > 0; emission starts at the least name.
        assert_eq!(canonical(&model), source);
    }

    #[test]
    fn canonical_is_a_function_of_topology() {
        let left = parse("s[separator](->b[cooler])(->a[heater])").unwrap();
        let right = parse("s[separator](->a[heater])(->b[cooler])").unwrap();
        assert_eq!(canonical(&left), canonical(&right));
    }
}
