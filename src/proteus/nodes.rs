//! Node index semantics at the XML boundary.
//!
//! Internal port indices are 0-based; `FlowIn`/`FlowOut`/`FromNode`/`ToNode`
//! are 1-based `xsd:positiveInteger`s. The conversion is explicit and
//! validated here, element-wise for comma-separated multi-valued forms.

use super::ExportError;

/// Format 0-based internal indices as a 1-based, comma-separated attribute
/// value.
///
/// A component with zero nodes has no representable flow index; asking for
/// one is an error rather than an empty attribute.
pub fn format_flow_indices(internal: &[usize], node_count: usize) -> Result<String, ExportError> {
    if node_count == 0 {
        return Err(ExportError::ZeroNodeFlow);
    }
    let mut out = String::new();
    for (i, index) in internal.iter().enumerate() {
        if *index >= node_count {
            return Err(ExportError::FlowIndexOutOfRange {
                value: (index + 1).to_string(),
                node_count,
            });
        }
        if i > 0 {
            out.push(',');
        }
        out.push_str(&(index + 1).to_string());
    }
    Ok(out)
}

/// Validate an already-formatted attribute value: every element must be a
/// positive integer within the owning item's node count.
pub fn validate_flow_attribute(value: &str, node_count: usize) -> Result<(), ExportError> {
    for element in value.split(',') {
        let parsed: usize = element.trim().parse().map_err(|_| ExportError::FlowIndexOutOfRange {
            value: element.trim().to_string(),
            node_count,
        })?;
        if parsed == 0 || parsed > node_count {
            return Err(ExportError::FlowIndexOutOfRange {
                value: value.to_string(),
                node_count,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_one_based() {
        assert_eq!(format_flow_indices(&[0], 2).unwrap(), "1");
        assert_eq!(format_flow_indices(&[0, 2], 4).unwrap(), "1,3");
    }

    #[test]
    fn zero_nodes_is_an_error_mentioning_positive_integer() {
        let err = format_flow_indices(&[0], 0).unwrap_err();
        assert!(err.to_string().contains("xsd:positiveInteger (>= 1)"));
    }

    #[test]
    fn out_of_range_internal_index_fails() {
        assert!(matches!(
            format_flow_indices(&[2], 2),
            Err(ExportError::FlowIndexOutOfRange { .. })
        ));
    }

    #[test]
    fn multi_valued_forms_validate_element_wise() {
        assert!(validate_flow_attribute("1,2", 2).is_ok());
        let err = validate_flow_attribute("1,3", 2).unwrap_err();
        let ExportError::FlowIndexOutOfRange { value, node_count } = err else {
            panic!("expected flow index error");
        };
        assert_eq!(value, "1,3");
        assert_eq!(node_count, 2);
    }

    #[test]
    fn zero_is_not_a_valid_node_number() {
        assert!(validate_flow_attribute("0", 2).is_err());
    }
}
