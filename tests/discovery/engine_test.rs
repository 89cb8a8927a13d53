//! Integration tests for the two-phase discovery run.

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;

use common::*;
use ontology_engine::discovery::RelationshipDiscovery;
use ontology_engine::model::{Cardinality, InferenceMethod};
use ontology_engine::store::ProjectSettings;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_run_resolves_then_matches() {
    let mut fx = Fixture::new();
    let users = fx.table("users", Some(100));
    let orders = fx.table("orders", Some(300));
    let user_pk = fx.column(pk(&users, "id", "uuid", 100));
    fx.column(pk(&orders, "id", "uuid", 300));
    let user_id = fx.column(col(&orders, "user_id", "uuid"));
    let buyer_id = fx.column(col(&orders, "buyer_id", "uuid"));
    fx.declare_fk(&user_id, &user_pk);
    fx.save();

    let validator = Arc::new(ScriptedValidator::new());
    validator.on("orders.user_id", "users.id", stats(300, 300, 100, 0, 0));
    validator.on("orders.buyer_id", "users.id", stats(300, 300, 90, 0, 10));

    let discovery = RelationshipDiscovery::new(Arc::clone(&fx.store), Arc::clone(&validator));
    let report = discovery
        .run(fx.project_id, fx.datasource_id, &CancellationToken::new())
        .await
        .unwrap();

    assert!(!report.legacy_pattern_matching);
    assert_eq!(report.fk.fk_relationships, 1);
    assert_eq!(report.fk.from_constraints, 1);
    assert_eq!(report.pk_match.candidates_evaluated, 1);
    assert_eq!(report.pk_match.inferred_relationships, 1);
    assert_eq!(report.total_relationships(), 2);

    // Phase 1 runs first and its source is not examined again.
    assert_eq!(
        validator.calls(),
        vec![
            "orders.user_id -> users.id",
            "orders.buyer_id -> orders.id",
            "orders.buyer_id -> users.id",
        ]
    );

    let inferred = fx.relationship(&buyer_id, &user_pk).await.unwrap();
    assert_eq!(inferred.inference_method, Some(InferenceMethod::PkMatch));
    assert_eq!(inferred.cardinality, Cardinality::ManyToOne);
    let declared = fx.relationship(&user_id, &user_pk).await.unwrap();
    assert!(declared.is_validated);
}

#[tokio::test]
async fn test_legacy_mode_comes_from_project_settings() {
    let mut fx = Fixture::new();
    let accounts = fx.table("accounts", Some(500));
    let users = fx.table("users", Some(100));
    fx.column(pk(&accounts, "id", "uuid", 500));
    let mut owner_id = col(&accounts, "owner_id", "uuid");
    owner_id.is_joinable = None;
    let owner_id = fx.column(owner_id);
    let user_pk = fx.column(pk(&users, "id", "uuid", 100));
    fx.save();

    let validator = Arc::new(ScriptedValidator::new());
    validator.on("accounts.owner_id", "users.id", stats(500, 500, 100, 0, 0));
    let discovery = RelationshipDiscovery::new(Arc::clone(&fx.store), Arc::clone(&validator));
    let cancel = CancellationToken::new();

    // Joinability was never determined, so only legacy mode considers it.
    let report = discovery
        .run(fx.project_id, fx.datasource_id, &cancel)
        .await
        .unwrap();
    assert!(!report.legacy_pattern_matching);
    assert_eq!(report.pk_match.candidates_evaluated, 0);
    assert!(validator.calls().is_empty());

    fx.store
        .set_legacy_pattern_matching(fx.project_id, true)
        .unwrap();
    let report = discovery
        .run(fx.project_id, fx.datasource_id, &cancel)
        .await
        .unwrap();
    assert!(report.legacy_pattern_matching);
    assert_eq!(report.pk_match.candidates_evaluated, 1);
    assert_eq!(report.pk_match.inferred_relationships, 1);

    let stored = fx.relationship(&owner_id, &user_pk).await.unwrap();
    assert_eq!(stored.cardinality, Cardinality::ManyToOne);
}

#[tokio::test]
async fn test_explicit_legacy_flag_overrides_settings() {
    let mut fx = Fixture::new();
    let accounts = fx.table("accounts", Some(500));
    let users = fx.table("users", Some(100));
    fx.column(pk(&accounts, "id", "uuid", 500));
    let mut owner_id = col(&accounts, "owner_id", "uuid");
    owner_id.is_joinable = None;
    fx.column(owner_id);
    fx.column(pk(&users, "id", "uuid", 100));
    fx.save();

    let validator = Arc::new(ScriptedValidator::new());
    let discovery = RelationshipDiscovery::new(Arc::clone(&fx.store), Arc::clone(&validator));

    let result = discovery
        .discover_pk_matches(fx.datasource_id, true, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.candidates_evaluated, 1);
    assert!(validator.was_called_for_source("accounts.owner_id"));
}

#[tokio::test]
async fn test_legacy_override_is_not_persisted() {
    let mut fx = Fixture::new();
    let accounts = fx.table("accounts", Some(500));
    let users = fx.table("users", Some(100));
    fx.column(pk(&accounts, "id", "uuid", 500));
    let mut owner_id = col(&accounts, "owner_id", "uuid");
    owner_id.is_joinable = None;
    fx.column(owner_id);
    fx.column(pk(&users, "id", "uuid", 100));
    fx.save();

    let validator = Arc::new(ScriptedValidator::new());
    let cancel = CancellationToken::new();

    let report = RelationshipDiscovery::new(Arc::clone(&fx.store), Arc::clone(&validator))
        .with_legacy_pattern_matching(true)
        .run(fx.project_id, fx.datasource_id, &cancel)
        .await
        .unwrap();
    assert!(report.legacy_pattern_matching);
    assert_eq!(report.pk_match.candidates_evaluated, 1);

    assert!(!fx
        .store
        .use_legacy_pattern_matching(fx.project_id)
        .await
        .unwrap());
    let report = RelationshipDiscovery::new(Arc::clone(&fx.store), Arc::clone(&validator))
        .run(fx.project_id, fx.datasource_id, &cancel)
        .await
        .unwrap();
    assert!(!report.legacy_pattern_matching);
    assert_eq!(report.pk_match.candidates_evaluated, 0);
}

#[tokio::test]
async fn test_cancelled_run_leaves_store_untouched() {
    let mut fx = Fixture::new();
    let users = fx.table("users", Some(100));
    let orders = fx.table("orders", Some(300));
    let user_pk = fx.column(pk(&users, "id", "uuid", 100));
    let user_id = fx.column(col(&orders, "user_id", "uuid"));
    fx.declare_fk(&user_id, &user_pk);
    fx.save();
    let before = fx.relationships().await;

    let validator = Arc::new(ScriptedValidator::new());
    let discovery = RelationshipDiscovery::new(Arc::clone(&fx.store), Arc::clone(&validator));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = discovery
        .run(fx.project_id, fx.datasource_id, &cancel)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(validator.calls().is_empty());
    assert_eq!(fx.relationships().await, before);
}
