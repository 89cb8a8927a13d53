//! Integration tests for phase 1 FK resolution.
//!
//! These run the resolver against an in-memory store and a scripted join
//! validator.

#[path = "../common/mod.rs"]
mod common;

use common::*;
use ontology_engine::discovery::{DiscoveryError, FkResolver};
use ontology_engine::model::{Cardinality, InferenceMethod, RelationshipType};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_declared_fk_is_validated_in_place() {
    let mut fx = Fixture::new();
    let users = fx.table("users", Some(100));
    let orders = fx.table("orders", Some(300));
    let user_pk = fx.column(pk(&users, "id", "uuid", 100));
    fx.column(pk(&orders, "id", "uuid", 300));
    let user_id = fx.column(col(&orders, "user_id", "uuid"));
    let declared = fx.declare_fk(&user_id, &user_pk);
    fx.save();

    let validator = ScriptedValidator::new();
    validator.on("orders.user_id", "users.id", stats(300, 300, 100, 0, 0));

    let result = FkResolver::new(fx.store.as_ref(), &validator)
        .resolve(fx.datasource_id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.fk_relationships, 1);
    assert_eq!(result.from_constraints, 1);
    assert_eq!(result.from_column_features, 0);
    assert_eq!(result.cardinality_fallbacks, 0);

    let stored = fx.relationship(&user_id, &user_pk).await.unwrap();
    assert_eq!(stored.id, declared.id);
    assert_eq!(stored.relationship_type, RelationshipType::Fk);
    assert_eq!(stored.inference_method, Some(InferenceMethod::ForeignKey));
    assert_eq!(stored.cardinality, Cardinality::ManyToOne);
    assert_eq!(stored.confidence, 1.0);
    assert!(stored.is_validated);
}

#[tokio::test]
async fn test_resolution_is_idempotent() {
    let mut fx = Fixture::new();
    let users = fx.table("users", Some(100));
    let orders = fx.table("orders", Some(300));
    let user_pk = fx.column(pk(&users, "id", "uuid", 100));
    let user_id = fx.column(col(&orders, "user_id", "uuid"));
    let buyer_id = fx.column(with_fk_hint(
        col(&orders, "buyer_id", "uuid"),
        "users",
        Some("id"),
        0.9,
    ));
    fx.declare_fk(&user_id, &user_pk);
    fx.save();

    let validator = ScriptedValidator::new();
    validator.on("orders.user_id", "users.id", stats(300, 300, 100, 0, 0));
    validator.on("orders.buyer_id", "users.id", stats(300, 300, 100, 0, 0));

    let resolver = FkResolver::new(fx.store.as_ref(), &validator);
    let cancel = CancellationToken::new();
    let first = resolver.resolve(fx.datasource_id, &cancel).await.unwrap();
    let after_first = fx.relationships().await;
    let second = resolver.resolve(fx.datasource_id, &cancel).await.unwrap();
    let after_second = fx.relationships().await;

    assert_eq!(first, second);
    assert_eq!(after_first.len(), 2);
    assert_eq!(after_first, after_second);
    assert!(fx.relationship(&buyer_id, &user_pk).await.is_some());
}

#[tokio::test]
async fn test_self_reference_is_resolved() {
    let mut fx = Fixture::new();
    let employees = fx.table("employees", Some(40));
    let id = fx.column(pk(&employees, "id", "integer", 40));
    let manager_id = fx.column(col(&employees, "manager_id", "integer"));
    fx.declare_fk(&manager_id, &id);
    fx.save();

    let validator = ScriptedValidator::new();
    validator.on("employees.manager_id", "employees.id", stats(36, 36, 6, 0, 34));

    let result = FkResolver::new(fx.store.as_ref(), &validator)
        .resolve(fx.datasource_id, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.fk_relationships, 1);

    let stored = fx.relationship(&manager_id, &id).await.unwrap();
    assert!(stored.is_self_referential());
    assert_eq!(stored.cardinality, Cardinality::ManyToOne);
    assert!(stored.is_validated);
}

#[tokio::test]
async fn test_validator_failure_falls_back_to_many_to_one() {
    let mut fx = Fixture::new();
    let users = fx.table("users", Some(100));
    let profiles = fx.table("profiles", Some(100));
    let user_pk = fx.column(pk(&users, "id", "uuid", 100));
    let owner = fx.column(col(&profiles, "owner", "uuid"));
    fx.declare_fk(&owner, &user_pk);
    fx.save();

    let validator = ScriptedValidator::new();
    validator.fail("profiles.owner", "users.id");

    let result = FkResolver::new(fx.store.as_ref(), &validator)
        .resolve(fx.datasource_id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.fk_relationships, 1);
    assert_eq!(result.cardinality_fallbacks, 1);
    let stored = fx.relationship(&owner, &user_pk).await.unwrap();
    assert_eq!(stored.cardinality, Cardinality::ManyToOne);
    assert!(stored.is_validated);
}

#[tokio::test]
async fn test_manual_pair_is_left_alone() {
    let mut fx = Fixture::new();
    let users = fx.table("users", Some(100));
    let orders = fx.table("orders", Some(300));
    let user_pk = fx.column(pk(&users, "id", "uuid", 100));
    let buyer_id = fx.column(with_fk_hint(
        col(&orders, "buyer_id", "uuid"),
        "users",
        None,
        0.95,
    ));
    fx.save();
    let manual = fx.add_manual(&buyer_id, &user_pk).await;

    let validator = ScriptedValidator::new();
    validator.on("orders.buyer_id", "users.id", stats(300, 300, 100, 0, 0));

    let result = FkResolver::new(fx.store.as_ref(), &validator)
        .resolve(fx.datasource_id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.fk_relationships, 0);
    assert_eq!(result.skipped_manual, 1);
    assert!(validator.calls().is_empty());

    let stored = fx.relationship(&buyer_id, &user_pk).await.unwrap();
    assert_eq!(stored, manual);
}

#[tokio::test]
async fn test_manual_pair_survives_declared_constraint() {
    let mut fx = Fixture::new();
    let users = fx.table("users", Some(100));
    let orders = fx.table("orders", Some(300));
    let user_pk = fx.column(pk(&users, "id", "uuid", 100));
    let user_id = fx.column(col(&orders, "user_id", "uuid"));
    fx.save();
    let manual = fx.add_manual(&user_id, &user_pk).await;

    // A later scan finds a database constraint on the same columns.
    fx.declare_fk(&user_id, &user_pk);
    fx.save();

    let validator = ScriptedValidator::new();
    validator.on("orders.user_id", "users.id", stats(300, 300, 100, 0, 0));

    let result = FkResolver::new(fx.store.as_ref(), &validator)
        .resolve(fx.datasource_id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.fk_relationships, 0);
    assert!(validator.calls().is_empty());
    assert_eq!(fx.relationships().await, vec![manual]);
}

#[tokio::test]
async fn test_feature_hint_to_missing_table_is_skipped() {
    let mut fx = Fixture::new();
    let orders = fx.table("orders", Some(300));
    fx.column(pk(&orders, "id", "uuid", 300));
    fx.column(with_fk_hint(
        col(&orders, "customer_id", "uuid"),
        "customers",
        None,
        0.9,
    ));
    fx.save();

    let validator = ScriptedValidator::new();
    let result = FkResolver::new(fx.store.as_ref(), &validator)
        .resolve(fx.datasource_id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.fk_relationships, 0);
    assert_eq!(result.skipped_unresolved, 1);
    assert!(validator.calls().is_empty());
    assert!(fx.relationships().await.is_empty());
}

#[tokio::test]
async fn test_qualified_feature_hint_resolves_to_primary_key() {
    let mut fx = Fixture::new();
    let users = fx.table("users", Some(100));
    let orders = fx.table("orders", Some(300));
    let user_pk = fx.column(pk(&users, "id", "uuid", 100));
    fx.column(col(&users, "email", "text"));
    let buyer_id = fx.column(with_fk_hint(
        col(&orders, "buyer_id", "uuid"),
        "public.users",
        None,
        0.85,
    ));
    fx.save();

    let validator = ScriptedValidator::new();
    validator.on("orders.buyer_id", "users.id", stats(100, 100, 100, 0, 0));

    let result = FkResolver::new(fx.store.as_ref(), &validator)
        .resolve(fx.datasource_id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.from_column_features, 1);
    let stored = fx.relationship(&buyer_id, &user_pk).await.unwrap();
    assert_eq!(stored.relationship_type, RelationshipType::Inferred);
    assert_eq!(stored.inference_method, Some(InferenceMethod::ColumnFeatures));
    assert_eq!(stored.confidence, 0.85);
    assert_eq!(stored.cardinality, Cardinality::OneToOne);
    assert_eq!(validator.calls(), vec!["orders.buyer_id -> users.id"]);
}

#[tokio::test]
async fn test_cancellation_stops_without_writing() {
    let mut fx = Fixture::new();
    let users = fx.table("users", Some(100));
    let orders = fx.table("orders", Some(300));
    let user_pk = fx.column(pk(&users, "id", "uuid", 100));
    let user_id = fx.column(col(&orders, "user_id", "uuid"));
    fx.declare_fk(&user_id, &user_pk);
    fx.save();

    let cancel = CancellationToken::new();
    let validator = ScriptedValidator::new();
    validator.cancel_during("orders.user_id", "users.id", &cancel);

    let err = FkResolver::new(fx.store.as_ref(), &validator)
        .resolve(fx.datasource_id, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, DiscoveryError::Cancelled));
    let stored = fx.relationship(&user_id, &user_pk).await.unwrap();
    assert!(!stored.is_validated);
    assert_eq!(stored.cardinality, Cardinality::Unknown);
}

#[tokio::test]
async fn test_already_cancelled_run_makes_no_calls() {
    let mut fx = Fixture::new();
    let users = fx.table("users", Some(100));
    let orders = fx.table("orders", Some(300));
    let user_pk = fx.column(pk(&users, "id", "uuid", 100));
    let user_id = fx.column(col(&orders, "user_id", "uuid"));
    fx.declare_fk(&user_id, &user_pk);
    fx.save();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let validator = ScriptedValidator::new();

    let err = FkResolver::new(fx.store.as_ref(), &validator)
        .resolve(fx.datasource_id, &cancel)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(validator.calls().is_empty());
}
