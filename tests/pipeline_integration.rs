//! End-to-end pipeline tests.
//!
//! Runs the whole resync (resolve, extract, project, materialize) against an
//! in-memory twin source and an in-memory graph store, covering:
//! - Both store strategies
//! - Generation rotation and pruning across runs
//! - Failed loads leaving the previous generation visible
//! - Export of staged artifacts

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use adt_twincache::adt::InMemorySource;
use adt_twincache::io::ArtifactReader;
use adt_twincache::models::{ModelDefinition, PropertyDeclaration, SchemaDescriptor};
use adt_twincache::services::ConnectorSettings;
use adt_twincache::storage::GraphStore;
use adt_twincache::{Error, InMemoryGraphStore, StoreStrategy, TwinCacheConnector};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

fn plant_source() -> InMemorySource {
    InMemorySource::new()
        .with_model(
            ModelDefinition::new("dtmi:com:example:Asset;1")
                .with_property("owner", "string")
                .with_relationship(
                    "feeds",
                    vec![PropertyDeclaration {
                        name: "rate".to_string(),
                        schema: SchemaDescriptor::Primitive("double".to_string()),
                    }],
                ),
        )
        .with_model(
            ModelDefinition::new("dtmi:com:example:Warehouse;1")
                .with_parent("dtmi:com:example:Asset;1")
                .with_property("capacity", "double")
                .with_relationship("contains", Vec::new()),
        )
        .with_model(
            ModelDefinition::new("dtmi:com:example:Pump;1")
                .with_parent("dtmi:com:example:Asset;1")
                .with_property("running", "boolean"),
        )
        .with_twin(json!({
            "$dtId": "w1",
            "$etag": "W/\"1\"",
            "$metadata": {"$model": "dtmi:com:example:Warehouse;1"},
            "owner": "acme",
            "capacity": 120.5
        }))
        .with_twin(json!({
            "$dtId": "p1",
            "$metadata": {"$model": "dtmi:com:example:Pump;1"},
            "running": true
        }))
        .with_twin(json!({
            "$dtId": "p2",
            "$metadata": {"$model": "dtmi:com:example:Pump;1"}
        }))
        .with_relationship(json!({
            "$relationshipId": "r1",
            "$sourceId": "w1",
            "$targetId": "p1",
            "$relationshipName": "contains"
        }))
        .with_relationship(json!({
            "$relationshipId": "r2",
            "$sourceId": "p1",
            "$targetId": "p2",
            "$relationshipName": "feeds",
            "rate": 2.5
        }))
}

fn settings(scratch: &Path, strategy: StoreStrategy, rotation: u32) -> ConnectorSettings {
    ConnectorSettings {
        cache_name: "plant".to_string(),
        rotation,
        strategy,
        scratch_dir: scratch.to_path_buf(),
        batch_size: 2,
        source_url: "https://adt.example.net".to_string(),
        keep_artifacts: false,
    }
}

fn connector(
    source: InMemorySource,
    store: &Arc<InMemoryGraphStore>,
    settings: ConnectorSettings,
) -> TwinCacheConnector<InMemorySource, Arc<InMemoryGraphStore>> {
    TwinCacheConnector::new(source, Arc::clone(store), settings)
}

fn count_matching(statements: &[String], fragment: &str) -> usize {
    statements.iter().filter(|s| s.contains(fragment)).count()
}

#[test]
fn test_bulk_run_loads_every_record() {
    let scratch = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryGraphStore::new());

    let report = connector(
        plant_source(),
        &store,
        settings(scratch.path(), StoreStrategy::BulkLoad, 3),
    )
    .run()
    .unwrap();

    assert_eq!(report.graph, "plant:1");
    assert_eq!(report.version, 1);
    assert_eq!(report.twins, 3);
    assert_eq!(report.relationships, 2);
    assert_eq!(report.twin_types, 2);
    assert_eq!(report.relationship_types, 2);

    let statements = store.statements("plant:1");
    assert_eq!(count_matching(&statements, "CREATE INDEX ON :`Warehouse`"), 1);
    assert_eq!(count_matching(&statements, "CREATE INDEX ON :`Pump`"), 1);
    assert_eq!(count_matching(&statements, "[:`contains`"), 1);
    assert_eq!(count_matching(&statements, "[:`feeds`"), 1);
    assert!(statements.iter().any(|s| s.contains("'acme'")));
    assert!(statements.iter().any(|s| s.contains("120.5")));

    let metadata = store.read_metadata("plantMetaData").unwrap();
    assert_eq!(metadata["lastVersion"], "1");
    assert_eq!(metadata["graphName"], "plant:1");
    assert_eq!(metadata["graphRotation"], "3");
    assert_eq!(metadata["sourceUrl"], "https://adt.example.net");

    // Staged artifacts are removed after a successful load.
    assert!(!scratch.path().join(&report.run_id).exists());
}

#[test]
fn test_direct_run_writes_one_statement_per_record() {
    let scratch = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryGraphStore::new());

    let report = connector(
        plant_source(),
        &store,
        settings(scratch.path(), StoreStrategy::DirectQuery, 1),
    )
    .run()
    .unwrap();

    assert_eq!(report.graph, "plant:1");
    assert_eq!(report.twins, 3);
    assert_eq!(report.relationships, 2);

    let statements = store.statements("plant:1");
    assert_eq!(count_matching(&statements, "CREATE (:`Pump`"), 2);
    assert_eq!(count_matching(&statements, "CREATE (:`Warehouse`"), 1);
    assert_eq!(count_matching(&statements, "CREATE (a)-[:"), 2);
    assert!(
        std::fs::read_dir(scratch.path()).unwrap().next().is_none(),
        "direct strategy stages no artifacts"
    );
}

#[test]
fn test_rotation_prunes_old_generations() {
    let scratch = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryGraphStore::new());

    let mut pruned = Vec::new();
    for _ in 0..4 {
        let report = connector(
            plant_source(),
            &store,
            settings(scratch.path(), StoreStrategy::BulkLoad, 2),
        )
        .run()
        .unwrap();
        pruned.extend(report.pruned);
    }

    assert_eq!(store.graph_names(), vec!["plant:3", "plant:4"]);
    assert_eq!(pruned, vec!["plant:1", "plant:2"]);
    assert_eq!(
        store.read_metadata("plantMetaData").unwrap()["lastVersion"],
        "4"
    );
}

#[test]
fn test_rotation_zero_replaces_in_place() {
    let scratch = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryGraphStore::new());
    store.execute("plant", "old generation").unwrap();

    let report = connector(
        plant_source(),
        &store,
        settings(scratch.path(), StoreStrategy::BulkLoad, 0),
    )
    .run()
    .unwrap();

    assert_eq!(report.graph, "plant");
    assert_eq!(store.graph_names(), vec!["plant"]);
    let statements = store.statements("plant");
    assert!(!statements.contains(&"old generation".to_string()));
    assert_eq!(count_matching(&statements, "CREATE INDEX"), 2);
}

#[test]
fn test_failed_load_keeps_previous_generation() {
    let scratch = tempfile::tempdir().unwrap();
    let failing = Arc::new(InMemoryGraphStore::new().failing_on("[:`feeds`"));
    failing.execute("plant:1", "first generation").unwrap();
    failing
        .write_metadata(
            "plantMetaData",
            &[("lastVersion".to_string(), "1".to_string())],
        )
        .unwrap();

    let err = connector(
        plant_source(),
        &failing,
        settings(scratch.path(), StoreStrategy::BulkLoad, 3),
    )
    .run()
    .unwrap_err();

    assert!(matches!(err, Error::Load { ref artifact, .. } if artifact == "edges/feeds.csv"));
    assert_eq!(failing.graph_names(), vec!["plant:1"]);
    assert_eq!(
        failing.read_metadata("plantMetaData").unwrap()["lastVersion"],
        "1"
    );
}

#[test]
fn test_dangling_relationship_aborts_run() {
    let scratch = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryGraphStore::new());
    let source = plant_source().with_relationship(json!({
        "$relationshipId": "r3",
        "$sourceId": "w1",
        "$targetId": "ghost",
        "$relationshipName": "contains"
    }));

    for strategy in [StoreStrategy::BulkLoad, StoreStrategy::DirectQuery] {
        let err = connector(source.clone(), &store, settings(scratch.path(), strategy, 3))
            .run()
            .unwrap_err();
        assert!(matches!(err, Error::Load { .. }), "{strategy:?}: {err}");
        assert!(err.to_string().contains("ghost"));
    }
    assert!(store.graph_names().is_empty());
    assert!(store.read_metadata("plantMetaData").unwrap().is_empty());
}

#[test]
fn test_schema_failure_stops_before_extraction() {
    let scratch = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryGraphStore::new());
    let source = plant_source()
        .with_model(ModelDefinition::new("dtmi:com:example:Site;1").with_property("location", "point"));

    let err = connector(source, &store, settings(scratch.path(), StoreStrategy::BulkLoad, 3))
        .run()
        .unwrap_err();

    assert_eq!(err.kind(), "schema_resolution");
    assert!(store.graph_names().is_empty());
}

#[test]
fn test_undeclared_property_fails_projection() {
    let scratch = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryGraphStore::new());
    let source = plant_source().with_twin(json!({
        "$dtId": "p3",
        "$metadata": {"$model": "dtmi:com:example:Pump;1"},
        "colour": "red"
    }));

    let err = connector(source, &store, settings(scratch.path(), StoreStrategy::BulkLoad, 3))
        .run()
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Projection { ref type_name, ref column, .. } if type_name == "Pump" && column == "colour"
    ));
    assert!(store.graph_names().is_empty());
}

#[test]
fn test_export_writes_readable_artifacts() {
    let scratch = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryGraphStore::new());

    let artifacts = connector(
        plant_source(),
        &store,
        settings(scratch.path(), StoreStrategy::BulkLoad, 3),
    )
    .export(out.path())
    .unwrap();

    assert_eq!(artifacts.nodes.len(), 2);
    assert_eq!(artifacts.edges.len(), 2);
    assert!(out.path().join("nodes").join("Pump.csv").exists());

    let pump = artifacts
        .nodes
        .iter()
        .find(|a| a.type_name == "Pump")
        .unwrap();
    let mut reader = ArtifactReader::open(pump).unwrap();
    let header: Vec<String> = reader
        .columns()
        .iter()
        .map(|c| c.annotated())
        .collect();
    assert_eq!(header, vec!["id:ID", "running:BOOLEAN"]);
    assert_eq!(reader.next_row().unwrap().unwrap(), vec!["p1", "true"]);
    assert_eq!(reader.next_row().unwrap().unwrap(), vec!["p2", ""]);
    assert!(reader.next_row().unwrap().is_none());

    // Export never touches the cache.
    assert!(store.graph_names().is_empty());
}

#[test]
fn test_large_doubles_stay_floating() {
    let scratch = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryGraphStore::new());
    let source = plant_source().with_twin(json!({
        "$dtId": "w2",
        "$metadata": {"$model": "dtmi:com:example:Warehouse;1"},
        "capacity": 1e20
    }));

    connector(source, &store, settings(scratch.path(), StoreStrategy::DirectQuery, 1))
        .run()
        .unwrap();

    let statements = store.statements("plant:1");
    assert!(statements.iter().any(|s| s.contains("`capacity`: 1e20")));
    assert!(!statements.iter().any(|s| s.contains("100000000000000000000")));
}
