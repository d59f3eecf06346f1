//! Engine-level transaction behavior under non-default configuration.

use plantgraph::engine::{Engine, TxAction, TxOutcome};
use plantgraph::model::{ModelMetadata, ModelType};
use plantgraph::ops::OpRequest;
use plantgraph::proteus::ExportOptions;
use plantgraph::tx::{SnapshotStrategy, TxConfig};
use serde_json::json;
use smol_str::SmolStr;

fn op(operation: &str, params: serde_json::Value) -> OpRequest {
    OpRequest { operation: SmolStr::new(operation), params }
}

#[test]
fn serialize_threshold_is_a_tunable() {
    let engine = Engine::with_config(
        TxConfig { serialize_component_threshold: 0, ..TxConfig::default() },
        ExportOptions::default(),
    )
    .unwrap();
    let model_id = engine.model_create(ModelType::Graph, ModelMetadata::default());

    let begun = engine.model_tx_begin(&model_id, None).unwrap();
    assert_eq!(begun.snapshot_strategy, SnapshotStrategy::Serialize);

    engine
        .model_tx_apply(
            &begun.transaction_id,
            &[op("add_equipment", json!({ "kind": "tank", "tag": "T-1" }))],
        )
        .unwrap();
    // The serialize strategy edits the live model; rollback reinstates from
    // the serialized snapshot.
    assert_eq!(engine.model_snapshot(&model_id).unwrap().component_count(), 1);
    engine
        .model_tx_commit(&begun.transaction_id, TxAction::Rollback, false)
        .unwrap();
    assert_eq!(engine.model_snapshot(&model_id).unwrap().component_count(), 0);
}

#[test]
fn add_then_remove_cancels_in_the_diff() {
    let engine = Engine::new().unwrap();
    let model_id = engine.model_create(ModelType::Graph, ModelMetadata::default());
    let begun = engine.model_tx_begin(&model_id, None).unwrap();

    engine
        .model_tx_apply(
            &begun.transaction_id,
            &[
                op("add_equipment", json!({ "kind": "tank", "tag": "T-1" })),
                op("add_control_loop", json!({ "tag": "LIC-1", "host": "T-1", "sensor_tag": "LT-1" })),
                op("remove_control_loop", json!({ "tag": "LIC-1" })),
                op("remove_component", json!({ "target": "T-1", "cascade": true })),
            ],
        )
        .unwrap();

    let outcome = engine
        .model_tx_commit(&begun.transaction_id, TxAction::Commit, true)
        .unwrap();
    match outcome {
        TxOutcome::Committed(result) => {
            assert_eq!(result.validation, Some(true));
            assert!(result.diff.is_empty(), "adds cancelled by removals: {:?}", result.diff);
            assert_eq!(result.operations_applied, 4);
        }
        other => panic!("expected commit, got {other:?}"),
    }
    assert_eq!(engine.model_snapshot(&model_id).unwrap().component_count(), 0);
}

#[test]
fn deprecated_operations_stay_discoverable() {
    let engine = Engine::new().unwrap();
    let schema = engine.operation_schema();
    let operations = schema["operations"].as_array().unwrap();

    let deprecated = operations.iter().find(|o| o["name"] == "insert_valve").unwrap();
    assert_eq!(deprecated["deprecated_in"], json!("1.3.0"));
    assert_eq!(deprecated["removal_planned"], json!("2.0.0"));

    let replacement = operations.iter().find(|o| o["name"] == "connect_components").unwrap();
    assert_eq!(replacement["replaces"], json!(["insert_valve"]));

    // Deprecated, not removed: it still executes.
    let model_id = engine.model_create(ModelType::Graph, ModelMetadata::default());
    let begun = engine.model_tx_begin(&model_id, None).unwrap();
    let records = engine
        .model_tx_apply(
            &begun.transaction_id,
            &[
                op("add_equipment", json!({ "kind": "tank", "tag": "T-1" })),
                op("add_equipment", json!({ "kind": "pump", "tag": "P-1" })),
                op("insert_valve", json!({ "from": "T-1", "to": "P-1", "valve_tag": "V-9" })),
            ],
        )
        .unwrap();
    assert!(records.iter().all(|r| r.ok), "{records:?}");
    engine
        .model_tx_commit(&begun.transaction_id, TxAction::Commit, true)
        .unwrap();
    let model = engine.model_snapshot(&model_id).unwrap();
    assert!(model.as_graph().unwrap().by_tag(&plantgraph::base::Tag::new("V-9")).is_some());
}

#[test]
fn begin_reports_strategy_and_start_time() {
    let engine = Engine::new().unwrap();
    let model_id = engine.model_create(ModelType::Linear, ModelMetadata::default());
    let begun = engine
        .model_tx_begin(&model_id, Some(json!({ "reason": "import cleanup" })))
        .unwrap();
    assert_eq!(begun.snapshot_strategy, SnapshotStrategy::DeepCopy);
    assert!(begun.started_at <= chrono::Utc::now());
    engine
        .model_tx_commit(&begun.transaction_id, TxAction::Commit, false)
        .unwrap();
}
