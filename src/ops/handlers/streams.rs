//! Linear-dialect operations.

use semver::Version;
use serde_json::json;
use smol_str::SmolStr;

use crate::base::ComponentId;
use crate::model::{Model, ModelError};
use crate::ops::{
    Deprecation, DiffMeta, OpCategory, OperationDescriptor, OperationOutcome, ParamSpec, ParamType,
    Params,
};

pub(super) fn register(out: &mut Vec<OperationDescriptor>) {
    out.push(update_stream_properties());
}

fn update_stream_properties() -> OperationDescriptor {
    OperationDescriptor {
        name: SmolStr::new("update_stream_properties"),
        version: Version::new(1, 0, 2),
        category: OpCategory::LinearDialect,
        description: SmolStr::new("Merge property values into a stream between two units"),
        params: vec![
            ParamSpec::required("from", ParamType::String, "Source unit name"),
            ParamSpec::required("to", ParamType::String, "Target unit name"),
            ParamSpec::required("properties", ParamType::Object, "Property values to merge"),
        ],
        diff: DiffMeta { modifies: true, ..DiffMeta::default() },
        deprecation: Deprecation::introduced("1.0.0"),
        handler: Box::new(|model: &mut Model, params: &Params<'_>| {
            let linear = model.as_linear_mut()?;
            let from = params.str("from")?;
            let to = params.str("to")?;
            let properties = params
                .opt_object("properties")?
                .expect("validated required object");
            let stream = linear
                .stream_mut(from, to)
                .ok_or_else(|| ModelError::TargetNotFound(format!("stream {from} -> {to}")))?;
            for (name, value) in properties {
                stream.properties.insert(SmolStr::new(name), value.clone());
            }
            let result = json!({ "from": from, "to": to, "properties": stream.properties.len() });
            Ok(OperationOutcome::modified(ComponentId::new(from), result))
        }),
        pre: None,
        post: None,
    }
}
