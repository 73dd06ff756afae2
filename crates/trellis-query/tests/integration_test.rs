//! Trellis Integration Tests
//!
//! End-to-end tests of the schema store and query engine over the
//! in-memory document store.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use serde_json::{json, Value};
use std::sync::Arc;
use trellis_common::{Object, QueryConfig, TrellisConfig, TrellisError};
use trellis_document::{MemoryStore, SchemaCollection};
use trellis_query::{Auth, QueryContext, StaticRoleProvider};
use trellis_schema::{SchemaDefaults, SchemaStore, StorageType};

// =============================================================================
// Helper Functions
// =============================================================================

fn obj(value: Value) -> Object {
    value.as_object().cloned().unwrap()
}

fn pointer(class_name: &str, id: &str) -> Value {
    json!({"__type": "Pointer", "className": class_name, "objectId": id})
}

fn setup_with(config: QueryConfig) -> (Arc<MemoryStore>, Arc<SchemaStore>, QueryContext) {
    let memory = Arc::new(MemoryStore::new());
    let schema = Arc::new(
        SchemaStore::load(
            memory.clone(),
            memory.clone(),
            Arc::new(SchemaDefaults::standard()),
        )
        .unwrap(),
    );
    let ctx = QueryContext::new(schema.clone(), memory.clone(), config);
    (memory, schema, ctx)
}

fn setup() -> (Arc<MemoryStore>, Arc<SchemaStore>, QueryContext) {
    setup_with(QueryConfig::default())
}

fn seed_users(memory: &MemoryStore) {
    memory
        .insert(
            "_User",
            obj(json!({
                "objectId": "u1",
                "username": "ann",
                "password": "$2b$10$hash",
                "sessionToken": "r:abc"
            })),
        )
        .unwrap();
    memory
        .insert(
            "_User",
            obj(json!({
                "objectId": "u2",
                "username": "bob",
                "password": "$2b$10$other"
            })),
        )
        .unwrap();
}

fn ids(results: &[Object]) -> Vec<&str> {
    results
        .iter()
        .filter_map(|row| row.get("objectId").and_then(Value::as_str))
        .collect()
}

// =============================================================================
// Schema Lifecycle
// =============================================================================

#[test]
fn test_add_class_twice() {
    let (_, schema, _) = setup();
    let fields = obj(json!({"title": {"type": "String"}}));

    let created = schema.add_class_if_not_exists("Book", &fields, None).unwrap();
    let names: Vec<&str> = created.fields.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["ACL", "createdAt", "objectId", "title", "updatedAt"]);

    let wire = serde_json::to_value(&created).unwrap();
    assert_eq!(wire["className"], "Book");
    assert_eq!(wire["fields"]["title"], json!({"type": "String"}));
    assert_eq!(wire["classLevelPermissions"]["addField"], json!({"*": true}));

    let err = schema.add_class_if_not_exists("Book", &fields, None).unwrap_err();
    assert!(matches!(err, TrellisError::InvalidClassName(_)));
}

#[test]
fn test_delete_relation_field_drops_join_collection() {
    let (memory, schema, _) = setup();
    schema
        .add_class_if_not_exists(
            "Team",
            &obj(json!({"members": {"type": "Relation", "targetClass": "_User"}})),
            None,
        )
        .unwrap();
    memory
        .insert("_Join:members:Team", obj(json!({"owningId": "t1", "relatedId": "u1"})))
        .unwrap();

    schema.delete_field("members", "Team").unwrap();
    assert!(!memory.collection_exists("_Join:members:Team"));
    assert!(schema.get_expected_type("Team", "members").is_none());
    let row = &memory.get_all_schemas().unwrap()[0];
    assert!(!row.contains_key("members"));

    let err = schema.delete_field("members", "Team").unwrap_err();
    assert!(matches!(err, TrellisError::ClassNotEmpty(_)));
}

#[test]
fn test_type_commitment_is_permanent() {
    let (_, schema, _) = setup();
    schema
        .validate_object("Score", &obj(json!({"points": 10})), None)
        .unwrap();
    schema
        .validate_object("Score", &obj(json!({"points": {"__op": "Increment", "amount": 1}})), None)
        .unwrap();

    let err = schema
        .validate_object("Score", &obj(json!({"points": "ten"})), None)
        .unwrap_err();
    assert!(matches!(err, TrellisError::IncorrectType(_)));
    assert!(err.is_schema_error());
    assert_eq!(schema.get_expected_type("Score", "points"), Some(StorageType::Number));
}

#[test]
fn test_single_geopoint_per_class() {
    let (_, schema, _) = setup();
    let point = json!({"__type": "GeoPoint", "latitude": 40.0, "longitude": -74.0});
    schema
        .validate_object("Venue", &obj(json!({"location": point.clone()})), None)
        .unwrap();

    let err = schema
        .validate_object("Venue", &obj(json!({"entrance": point})), None)
        .unwrap_err();
    assert!(matches!(err, TrellisError::IncorrectType(_)));
    assert!(!schema.has_keys("Venue", &["entrance"]));
}

#[test]
fn test_clp_document_rejections() {
    let (_, schema, _) = setup();
    for bad in [
        json!({"publish": {"*": true}}),
        json!({"find": {"bob": true}}),
        json!({"find": {"*": false}}),
    ] {
        let err = schema
            .add_class_if_not_exists("Guarded", &Object::new(), Some(&bad))
            .unwrap_err();
        assert!(matches!(err, TrellisError::InvalidJson(_)), "{} accepted", bad);
    }
    assert!(!schema.has_class("Guarded").unwrap());
}

// =============================================================================
// Query Engine
// =============================================================================

#[test]
fn test_user_password_never_returned() {
    let (memory, _, ctx) = setup();
    seed_users(&memory);

    let response = ctx
        .find(&Auth::master(), "_User", &Object::new(), &Object::new())
        .unwrap();
    assert_eq!(response.results.len(), 2);
    assert!(response.results.iter().all(|row| !row.contains_key("password")));
    assert_eq!(response.results[0]["username"], "ann");

    let options = obj(json!({"keys": "username,password"}));
    let response = ctx
        .find(&Auth::anonymous(), "_User", &Object::new(), &options)
        .unwrap();
    for row in &response.results {
        assert!(!row.contains_key("password"));
        assert!(!row.contains_key("sessionToken"));
        assert!(row.contains_key("username"));
        assert!(row.contains_key("objectId"));
    }
}

#[test]
fn test_select_end_to_end() {
    let (memory, _, ctx) = setup();
    memory.insert("Team", obj(json!({"minAge": 12}))).unwrap();
    memory.insert("Team", obj(json!({"minAge": 16}))).unwrap();
    for (name, age) in [("ann", 12), ("bob", 14), ("cat", 16)] {
        memory.insert("Player", obj(json!({"name": name, "age": age}))).unwrap();
    }

    let where_clause = obj(json!({
        "age": {"$select": {"query": {"className": "Team", "where": {}}, "key": "minAge"}}
    }));
    let options = obj(json!({"order": "name"}));
    let response = ctx
        .find(&Auth::anonymous(), "Player", &where_clause, &options)
        .unwrap();
    let names: Vec<&Value> = response.results.iter().map(|row| &row["name"]).collect();
    assert_eq!(names, vec!["ann", "cat"]);
}

#[test]
fn test_in_query_end_to_end() {
    let (memory, _, ctx) = setup();
    memory.insert("Team", obj(json!({"objectId": "red", "league": "A"}))).unwrap();
    memory.insert("Team", obj(json!({"objectId": "blue", "league": "B"}))).unwrap();
    memory
        .insert("Player", obj(json!({"objectId": "p1", "team": pointer("Team", "red")})))
        .unwrap();
    memory
        .insert("Player", obj(json!({"objectId": "p2", "team": pointer("Team", "blue")})))
        .unwrap();

    let in_league = obj(json!({
        "team": {"$inQuery": {"where": {"league": "A"}, "className": "Team"}}
    }));
    let response = ctx.find(&Auth::master(), "Player", &in_league, &Object::new()).unwrap();
    assert_eq!(ids(&response.results), vec!["p1"]);

    let not_in_league = obj(json!({
        "team": {"$notInQuery": {"where": {"league": "A"}, "className": "Team"}}
    }));
    let response = ctx.find(&Auth::master(), "Player", &not_in_league, &Object::new()).unwrap();
    assert_eq!(ids(&response.results), vec!["p2"]);
}

#[test]
fn test_include_expansion() {
    let (memory, _, ctx) = setup();
    seed_users(&memory);
    memory
        .insert(
            "Post",
            obj(json!({"objectId": "post1", "title": "Hello", "author": pointer("_User", "u1")})),
        )
        .unwrap();
    memory
        .insert(
            "Comment",
            obj(json!({
                "objectId": "c1",
                "post": pointer("Post", "post1"),
                "mentions": [pointer("_User", "u2")]
            })),
        )
        .unwrap();

    let options = obj(json!({"include": "post.author,mentions"}));
    let response = ctx
        .find(&Auth::anonymous(), "Comment", &Object::new(), &options)
        .unwrap();
    let comment = &response.results[0];

    let post = &comment["post"];
    assert_eq!(post["__type"], "Object");
    assert_eq!(post["className"], "Post");
    assert_eq!(post["title"], "Hello");

    let author = &post["author"];
    assert_eq!(author["__type"], "Object");
    assert_eq!(author["username"], "ann");
    assert!(author.get("password").is_none());
    assert!(author.get("sessionToken").is_none());

    assert_eq!(comment["mentions"][0]["username"], "bob");
}

#[test]
fn test_include_with_mixed_classes_is_skipped() {
    let (memory, _, ctx) = setup();
    memory.insert("Cat", obj(json!({"objectId": "c1"}))).unwrap();
    memory.insert("Dog", obj(json!({"objectId": "d1"}))).unwrap();
    memory
        .insert("Owner", obj(json!({"pets": [pointer("Cat", "c1"), pointer("Dog", "d1")]})))
        .unwrap();

    let options = obj(json!({"include": ["pets"]}));
    let response = ctx.find(&Auth::master(), "Owner", &Object::new(), &options).unwrap();
    assert_eq!(response.results[0]["pets"][0], pointer("Cat", "c1"));
    assert_eq!(response.results[0]["pets"][1], pointer("Dog", "d1"));
}

#[test]
fn test_count_ignores_pagination() {
    let (memory, _, ctx) = setup();
    for n in 0..5 {
        memory.insert("Item", obj(json!({"n": n}))).unwrap();
    }

    let options = obj(json!({"count": true, "limit": 2, "skip": 1, "order": "-n"}));
    let response = ctx.find(&Auth::master(), "Item", &Object::new(), &options).unwrap();
    assert_eq!(response.count, Some(5));
    let values: Vec<&Value> = response.results.iter().map(|row| &row["n"]).collect();
    assert_eq!(values, vec![3, 2]);

    let response = ctx.find(&Auth::master(), "Item", &Object::new(), &Object::new()).unwrap();
    assert_eq!(response.count, None);
}

#[test]
fn test_row_acl_filtering() {
    let (memory, _, ctx) = setup();
    memory
        .insert("Note", obj(json!({"objectId": "public", "ACL": {"*": {"read": true}}})))
        .unwrap();
    memory
        .insert("Note", obj(json!({"objectId": "mine", "ACL": {"u1": {"read": true}}})))
        .unwrap();
    memory
        .insert("Note", obj(json!({"objectId": "staff", "ACL": {"role:staff": {"read": true}}})))
        .unwrap();

    let roles = Arc::new(StaticRoleProvider::new());
    roles.assign_role("u1", "editor").unwrap();
    roles.add_inheritance("editor", "staff").unwrap();
    let ann = Auth::for_user(obj(json!({"objectId": "u1"}))).with_roles(roles);

    let response = ctx.find(&ann, "Note", &Object::new(), &Object::new()).unwrap();
    assert_eq!(ids(&response.results), vec!["public", "mine", "staff"]);

    let response = ctx
        .find(&Auth::anonymous(), "Note", &Object::new(), &Object::new())
        .unwrap();
    assert_eq!(ids(&response.results), vec!["public"]);

    let response = ctx.find(&Auth::master(), "Note", &Object::new(), &Object::new()).unwrap();
    assert_eq!(response.results.len(), 3);
}

#[test]
fn test_sessions_scoped_to_owner() {
    let (memory, _, ctx) = setup();
    memory
        .insert("_Session", obj(json!({"objectId": "s1", "user": pointer("_User", "u1")})))
        .unwrap();
    memory
        .insert("_Session", obj(json!({"objectId": "s2", "user": pointer("_User", "u2")})))
        .unwrap();

    let ann = Auth::for_user(obj(json!({"objectId": "u1"})));
    let response = ctx.find(&ann, "_Session", &Object::new(), &Object::new()).unwrap();
    assert_eq!(ids(&response.results), vec!["s1"]);

    let err = ctx
        .find(&Auth::anonymous(), "_Session", &Object::new(), &Object::new())
        .unwrap_err();
    assert!(matches!(err, TrellisError::InvalidSessionToken(_)));
}

#[test]
fn test_class_level_find_permission() {
    let (memory, schema, ctx) = setup();
    schema
        .add_class_if_not_exists("Vault", &Object::new(), Some(&json!({"find": {"role:admin": true}})))
        .unwrap();
    memory.insert("Vault", obj(json!({"secret": 42}))).unwrap();

    let err = ctx
        .find(&Auth::anonymous(), "Vault", &Object::new(), &Object::new())
        .unwrap_err();
    assert!(matches!(err, TrellisError::PermissionDenied(_)));
    assert!(err.is_access_error());

    let roles = Arc::new(StaticRoleProvider::new());
    roles.assign_role("u9", "admin").unwrap();
    let admin = Auth::for_user(obj(json!({"objectId": "u9"}))).with_roles(roles);
    let response = ctx.find(&admin, "Vault", &Object::new(), &Object::new()).unwrap();
    assert_eq!(response.results.len(), 1);

    let response = ctx.find(&Auth::master(), "Vault", &Object::new(), &Object::new()).unwrap();
    assert_eq!(response.results.len(), 1);
}

#[test]
fn test_redirect_class_name_for_key() {
    let (memory, schema, ctx) = setup();
    seed_users(&memory);
    schema
        .add_class_if_not_exists(
            "Post",
            &obj(json!({"likers": {"type": "Relation", "targetClass": "_User"}})),
            None,
        )
        .unwrap();

    let options = obj(json!({"redirectClassNameForKey": "likers"}));
    let response = ctx.find(&Auth::master(), "Post", &Object::new(), &options).unwrap();
    assert_eq!(ids(&response.results), vec!["u1", "u2"]);
}

#[test]
fn test_locked_down_config() {
    let config = TrellisConfig::from_toml_str(
        r#"
        [query]
        allow_client_class_creation = false
        max_where_depth = 8
        "#,
    )
    .unwrap();
    assert_eq!(config.schema.schema_collection, "_SCHEMA");

    let (_, schema, ctx) = setup_with(config.query);
    let err = ctx
        .find(&Auth::anonymous(), "Unknown", &Object::new(), &Object::new())
        .unwrap_err();
    assert!(matches!(err, TrellisError::OperationForbidden(_)));

    schema.add_class_if_not_exists("Known", &Object::new(), None).unwrap();
    assert!(ctx
        .find(&Auth::anonymous(), "Known", &Object::new(), &Object::new())
        .is_ok());

    let mut deep = json!({"a": 1});
    for _ in 0..8 {
        deep = json!({"$or": [deep]});
    }
    let err = ctx
        .find(&Auth::master(), "Known", &obj(deep), &Object::new())
        .unwrap_err();
    assert!(matches!(err, TrellisError::InvalidQuery(_)));
}

#[test]
fn test_bad_options_rejected() {
    let (_, _, ctx) = setup();
    let err = ctx
        .find(&Auth::master(), "Book", &Object::new(), &obj(json!({"explain": true})))
        .unwrap_err();
    assert!(matches!(err, TrellisError::InvalidJson(_)));
}
