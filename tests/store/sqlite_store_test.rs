//! Integration tests for the SQLite relationship store.

#[path = "../common/mod.rs"]
mod common;

use common::*;
use ontology_engine::model::{
    Cardinality, ColumnFeatures, ColumnPurpose, DiscoveryMetrics, InferenceMethod,
    RelationshipType, SchemaRelationship,
};
use ontology_engine::store::{ProjectSettings, SchemaRepository, SqliteStore, StoreError};
use uuid::Uuid;

fn metrics(matched: i64) -> DiscoveryMetrics {
    DiscoveryMetrics {
        match_rate: 1.0,
        source_distinct: matched,
        target_distinct: matched / 2,
        matched_count: matched,
    }
}

#[tokio::test]
async fn test_manual_rows_are_never_overwritten() {
    let mut fx = Fixture::new();
    let users = fx.table("users", Some(100));
    let orders = fx.table("orders", Some(300));
    let user_pk = fx.column(pk(&users, "id", "uuid", 100));
    let buyer_id = fx.column(col(&orders, "buyer_id", "uuid"));
    fx.save();
    let manual = fx.add_manual(&buyer_id, &user_pk).await;

    let inferred = SchemaRelationship::discovered(
        fx.datasource_id,
        &buyer_id,
        &user_pk,
        InferenceMethod::PkMatch,
        0.9,
        Cardinality::ManyToOne,
    );
    fx.store
        .upsert_relationship_with_metrics(&inferred, &metrics(100))
        .await
        .unwrap();

    assert_eq!(fx.relationships().await, vec![manual]);
    assert_eq!(
        fx.store.relationship_metrics(buyer_id.id, user_pk.id).unwrap(),
        None
    );
}

#[tokio::test]
async fn test_upsert_converges_on_column_pair() {
    let mut fx = Fixture::new();
    let users = fx.table("users", Some(100));
    let orders = fx.table("orders", Some(300));
    let user_pk = fx.column(pk(&users, "id", "uuid", 100));
    let buyer_id = fx.column(col(&orders, "buyer_id", "uuid"));
    fx.save();

    let first = SchemaRelationship::discovered(
        fx.datasource_id,
        &buyer_id,
        &user_pk,
        InferenceMethod::PkMatch,
        0.85,
        Cardinality::OneToOne,
    );
    fx.store.upsert_relationship(&first).await.unwrap();

    let second = SchemaRelationship::discovered(
        fx.datasource_id,
        &buyer_id,
        &user_pk,
        InferenceMethod::PkMatch,
        0.9,
        Cardinality::ManyToOne,
    );
    fx.store.upsert_relationship(&second).await.unwrap();

    let stored = fx.relationships().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, first.id);
    assert_eq!(stored[0].confidence, 0.9);
    assert_eq!(stored[0].cardinality, Cardinality::ManyToOne);
}

#[tokio::test]
async fn test_metrics_survive_plain_upsert() {
    let mut fx = Fixture::new();
    let users = fx.table("users", Some(100));
    let orders = fx.table("orders", Some(300));
    let user_pk = fx.column(pk(&users, "id", "uuid", 100));
    let buyer_id = fx.column(col(&orders, "buyer_id", "uuid"));
    fx.save();

    let rel = SchemaRelationship::discovered(
        fx.datasource_id,
        &buyer_id,
        &user_pk,
        InferenceMethod::PkMatch,
        0.9,
        Cardinality::ManyToOne,
    );
    fx.store
        .upsert_relationship_with_metrics(&rel, &metrics(100))
        .await
        .unwrap();
    fx.store.upsert_relationship(&rel).await.unwrap();
    assert_eq!(
        fx.store.relationship_metrics(buyer_id.id, user_pk.id).unwrap(),
        Some(metrics(100))
    );

    fx.store
        .upsert_relationship_with_metrics(&rel, &metrics(80))
        .await
        .unwrap();
    assert_eq!(
        fx.store.relationship_metrics(buyer_id.id, user_pk.id).unwrap(),
        Some(metrics(80))
    );
}

#[tokio::test]
async fn test_snapshot_round_trip() {
    let mut fx = Fixture::new();
    let users = fx.table("users", Some(100));
    let orders = fx.table("orders", None);
    let user_pk = fx.column(pk(&users, "id", "uuid", 100));
    let buyer_id = fx.column(with_purpose(
        with_fk_hint(col(&orders, "buyer_id", "uuid"), "users", Some("id"), 0.7),
        ColumnPurpose::Identifier,
    ));
    let mut note = with_distinct(col(&orders, "note", "text"), None);
    note.is_joinable = None;
    let note = fx.column(note);
    fx.save();

    let tables = fx.store.list_tables(fx.datasource_id).await.unwrap();
    assert_eq!(tables, vec![orders, users]);

    let columns = fx.store.list_columns(fx.datasource_id).await.unwrap();
    assert_eq!(columns, vec![buyer_id.clone(), note, user_pk]);

    fx.store
        .set_column_features(
            buyer_id.id,
            Some(&ColumnFeatures {
                purpose: Some(ColumnPurpose::Measure),
                ..Default::default()
            }),
        )
        .unwrap();
    let columns = fx.store.list_columns(fx.datasource_id).await.unwrap();
    assert!(columns[0].is_measure());
    assert!(columns[0].fk_target_hint().is_none());
}

#[test]
fn test_features_on_unknown_column() {
    let store = SqliteStore::open_in_memory().unwrap();
    let err = store.set_column_features(Uuid::new_v4(), None).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn test_relationship_details_are_named_and_ordered() {
    let mut fx = Fixture::new();
    let users = fx.table("users", Some(100));
    let orders = fx.table("orders", Some(300));
    let user_pk = fx.column(pk(&users, "id", "uuid", 100));
    let seller_id = fx.column(col(&orders, "seller_id", "uuid"));
    let buyer_id = fx.column(col(&orders, "buyer_id", "uuid"));
    fx.declare_fk(&seller_id, &user_pk);
    fx.save();

    let inferred = SchemaRelationship::discovered(
        fx.datasource_id,
        &buyer_id,
        &user_pk,
        InferenceMethod::PkMatch,
        0.9,
        Cardinality::ManyToOne,
    );
    fx.store
        .upsert_relationship_with_metrics(&inferred, &metrics(100))
        .await
        .unwrap();

    let details = fx.store.list_relationship_details(fx.datasource_id).unwrap();
    let named: Vec<_> = details
        .iter()
        .map(|d| (d.source.to_string(), d.target.to_string()))
        .collect();
    assert_eq!(
        named,
        vec![
            (
                "public.orders.buyer_id".to_string(),
                "public.users.id".to_string()
            ),
            (
                "public.orders.seller_id".to_string(),
                "public.users.id".to_string()
            ),
        ]
    );
    assert_eq!(details[0].metrics, Some(metrics(100)));
    assert_eq!(details[1].metrics, None);
    assert_eq!(details[1].relationship.relationship_type, RelationshipType::Fk);
}

#[tokio::test]
async fn test_relationships_are_scoped_to_datasource() {
    let mut fx = Fixture::new();
    let users = fx.table("users", Some(100));
    let orders = fx.table("orders", Some(300));
    let user_pk = fx.column(pk(&users, "id", "uuid", 100));
    let user_id = fx.column(col(&orders, "user_id", "uuid"));
    fx.declare_fk(&user_id, &user_pk);
    fx.save();

    let other = fx
        .store
        .register_datasource("other", fx.project_id, "sqlite", "other.db")
        .unwrap();

    assert_eq!(fx.relationships().await.len(), 1);
    assert!(fx
        .store
        .list_existing_relationships(other)
        .await
        .unwrap()
        .is_empty());
    assert!(fx.store.list_tables(other).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_legacy_setting_is_per_project() {
    let store = SqliteStore::open_in_memory().unwrap();
    let legacy = Uuid::new_v4();
    let modern = Uuid::new_v4();

    store.set_legacy_pattern_matching(legacy, true).unwrap();
    assert!(store.use_legacy_pattern_matching(legacy).await.unwrap());
    assert!(!store.use_legacy_pattern_matching(modern).await.unwrap());

    store.set_legacy_pattern_matching(legacy, false).unwrap();
    assert!(!store.use_legacy_pattern_matching(legacy).await.unwrap());
}

#[tokio::test]
async fn test_project_default_applies_only_once() {
    let store = SqliteStore::open_in_memory().unwrap();
    let project = Uuid::new_v4();

    store.init_project_settings(project, true).unwrap();
    assert!(store.use_legacy_pattern_matching(project).await.unwrap());

    store.set_legacy_pattern_matching(project, false).unwrap();
    store.init_project_settings(project, true).unwrap();
    assert!(!store.use_legacy_pattern_matching(project).await.unwrap());
}

#[test]
fn test_reopen_file_store() {
    let dir = std::env::temp_dir().join(format!("ontology-store-{}", Uuid::new_v4()));
    let path = dir.join("store.db");

    let id = {
        let store = SqliteStore::open(&path).unwrap();
        store
            .register_datasource("shop", Uuid::new_v4(), "sqlite", "shop.db")
            .unwrap()
    };
    let store = SqliteStore::open(&path).unwrap();
    let found = store.find_datasource("shop").unwrap().map(|(id, _)| id);
    assert_eq!(found, Some(id));

    drop(store);
    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_snapshot_drops_vanished_constraints() {
    let mut fx = Fixture::new();
    let users = fx.table("users", Some(100));
    let orders = fx.table("orders", Some(300));
    let user_pk = fx.column(pk(&users, "id", "uuid", 100));
    let user_id = fx.column(col(&orders, "user_id", "uuid"));
    let buyer_id = fx.column(col(&orders, "buyer_id", "uuid"));
    fx.declare_fk(&user_id, &user_pk);
    fx.save();
    let manual = fx.add_manual(&buyer_id, &user_pk).await;

    fx.foreign_keys.clear();
    fx.save();

    assert_eq!(fx.relationships().await, vec![manual]);
}

#[tokio::test]
async fn test_snapshot_drops_vanished_tables_and_their_relationships() {
    let mut fx = Fixture::new();
    let users = fx.table("users", Some(100));
    let orders = fx.table("orders", Some(300));
    let user_pk = fx.column(pk(&users, "id", "uuid", 100));
    let buyer_id = fx.column(col(&orders, "buyer_id", "uuid"));
    let seller_id = fx.column(col(&orders, "seller_id", "uuid"));
    fx.save();

    let inferred = SchemaRelationship::discovered(
        fx.datasource_id,
        &buyer_id,
        &user_pk,
        InferenceMethod::PkMatch,
        0.9,
        Cardinality::ManyToOne,
    );
    fx.store
        .upsert_relationship_with_metrics(&inferred, &metrics(100))
        .await
        .unwrap();
    let manual = fx.add_manual(&seller_id, &user_pk).await;

    fx.tables.retain(|t| t.id != orders.id);
    fx.columns.retain(|c| c.table_id != orders.id);
    fx.save();

    assert_eq!(fx.store.list_tables(fx.datasource_id).await.unwrap(), vec![users]);
    assert_eq!(
        fx.store.list_columns(fx.datasource_id).await.unwrap(),
        vec![user_pk]
    );
    // User-authored rows are never removed by a scan.
    assert_eq!(fx.relationships().await, vec![manual]);
}
