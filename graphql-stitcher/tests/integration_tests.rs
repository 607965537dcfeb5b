use std::time::Duration;

use graphql_stitcher::Configuration;
use graphql_stitcher::IntrospectionKind;
use graphql_stitcher::LocalSubschema;
use graphql_stitcher::RebuildError;
use graphql_stitcher::RefreshState;
use graphql_stitcher::Stitcher;
use graphql_stitcher::SubschemaConfig;
use graphql_stitcher::Transform;
use graphql_stitcher::error::IntrospectionError;
use graphql_stitcher::graphql::Request;
use graphql_stitcher::graphql::Response;
use graphql_stitcher::json_ext::Object;
use graphql_stitcher::json_ext::Value;
use graphql_stitcher::test_harness::MockService;
use pretty_assertions::assert_eq;
use serde_json_bytes::json;
use test_log::test;

const LOCAL_SDL: &str = "type Query { subtract(x: Int, y: Int): Int }";
const REMOTE_SDL: &str = "type Query { add(x: Int, y: Int): Int }";

fn int(args: &Object, name: &str) -> i64 {
    args.get(name).and_then(Value::as_i64).unwrap_or(0)
}

fn local() -> LocalSubschema {
    let service = MockService::new(LOCAL_SDL)
        .unwrap()
        .with_resolver("subtract", |args| json!(int(args, "x") - int(args, "y")));
    LocalSubschema::parse(LOCAL_SDL, service).unwrap()
}

fn remote() -> MockService {
    MockService::new(REMOTE_SDL)
        .unwrap()
        .with_resolver("add", |args| json!(int(args, "x") + int(args, "y")))
}

async fn query(stitcher: &Stitcher, query: &str) -> Response {
    stitcher
        .execute(Request::builder().query(query).build())
        .await
}

fn query_fields(stitcher: &Stitcher) -> Vec<String> {
    stitcher
        .schema()
        .query_fields()
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[test(tokio::test)]
async fn stitches_remote_and_local_schemas() {
    let stitcher = Stitcher::builder()
        .local(local())
        .subschema(SubschemaConfig::new(remote()))
        .build()
        .await
        .unwrap();

    let response = query(&stitcher, "{ add(x: 1, y: 3) subtract(x: 4, y: 3) }").await;
    insta::assert_json_snapshot!(response, @r###"
    {
      "data": {
        "add": 4,
        "subtract": 1
      }
    }
    "###);
}

#[test(tokio::test)]
async fn add_remote_schemas_stitches_after_startup() {
    let stitcher = Stitcher::builder().local(local()).build().await.unwrap();
    assert_eq!(query_fields(&stitcher), vec!["subtract"]);

    stitcher
        .add_remote_schemas([SubschemaConfig::new(remote())])
        .await
        .unwrap();

    let response = query(&stitcher, "{ add(x: 1, y: 3) subtract(x: 4, y: 3) }").await;
    assert_eq!(response.data, Some(json!({ "add": 4, "subtract": 1 })));
}

#[test(tokio::test)]
async fn add_remote_schemas_is_additive() {
    let multiply_sdl = "type Query { multiply(x: Int, y: Int): Int }";
    let multiply = MockService::new(multiply_sdl)
        .unwrap()
        .with_resolver("multiply", |args| json!(int(args, "x") * int(args, "y")));
    let stitcher = Stitcher::builder()
        .local(local())
        .subschema(SubschemaConfig::new(remote()))
        .build()
        .await
        .unwrap();

    stitcher
        .add_remote_schemas([SubschemaConfig::new(multiply)])
        .await
        .unwrap();

    assert_eq!(stitcher.remote_schema_count(), 2);
    assert_eq!(query_fields(&stitcher), vec!["add", "multiply", "subtract"]);
    let response = query(
        &stitcher,
        "{ add(x: 1, y: 3) subtract(x: 4, y: 3) multiply(x: 4, y: 3) }",
    )
    .await;
    assert_eq!(
        response.data,
        Some(json!({ "add": 4, "subtract": 1, "multiply": 12 }))
    );
}

#[test(tokio::test)]
async fn transforms_rename_remote_root_fields() {
    let stitcher = Stitcher::builder()
        .local(local())
        .subschema(SubschemaConfig::new(remote()).with_transform(Transform::RenameRootFields {
            prefix: "new_".to_string(),
        }))
        .build()
        .await
        .unwrap();

    let response = query(&stitcher, "{ new_add(x: 1, y: 3) subtract(x: 4, y: 3) }").await;
    assert_eq!(response.data, Some(json!({ "new_add": 4, "subtract": 1 })));
}

#[test(tokio::test)]
async fn refresh_picks_up_remote_changes() {
    let remote = remote().with_resolver("divide", |args| json!(int(args, "x") / int(args, "y")));
    let stitcher = Stitcher::builder()
        .local(local())
        .subschema(SubschemaConfig::new(remote.clone()))
        .build()
        .await
        .unwrap();

    remote
        .replace("type Query { divide(x: Int, y: Int): Int }")
        .unwrap();
    assert_eq!(query_fields(&stitcher), vec!["add", "subtract"]);

    stitcher.refresh_remote_schemas().await.unwrap();

    assert_eq!(query_fields(&stitcher), vec!["divide", "subtract"]);
    let response = query(&stitcher, "{ divide(x: 8, y: 2) }").await;
    assert_eq!(response.data, Some(json!({ "divide": 4 })));
}

#[test(tokio::test)]
async fn failed_refresh_keeps_the_previous_schema() {
    let remote = remote();
    let stitcher = Stitcher::builder()
        .local(local())
        .subschema(SubschemaConfig::new(remote.clone()))
        .build()
        .await
        .unwrap();
    let before = stitcher.schema();

    remote.set_failing(true);
    let err = stitcher.refresh_remote_schemas().await.unwrap_err();

    assert!(
        matches!(
            err,
            RebuildError::Introspection(IntrospectionError::Request { .. })
        ),
        "{err}"
    );
    assert_eq!(stitcher.schema().schema_id(), before.schema_id());
    assert_eq!(query_fields(&stitcher), vec!["add", "subtract"]);
    let response = query(&stitcher, "{ subtract(x: 4, y: 3) }").await;
    assert_eq!(response.data, Some(json!({ "subtract": 1 })));
}

#[test(tokio::test)]
async fn failed_add_keeps_the_appended_subschema() {
    let broken = remote();
    broken.set_failing(true);
    let stitcher = Stitcher::builder().local(local()).build().await.unwrap();

    assert!(
        stitcher
            .add_remote_schemas([SubschemaConfig::new(broken.clone())])
            .await
            .is_err()
    );
    assert_eq!(stitcher.remote_schema_count(), 1);
    assert_eq!(query_fields(&stitcher), vec!["subtract"]);

    broken.set_failing(false);
    stitcher.refresh_remote_schemas().await.unwrap();
    assert_eq!(query_fields(&stitcher), vec!["add", "subtract"]);
}

#[test(tokio::test)]
async fn preconfigured_subschemas_must_introspect() {
    let result = Stitcher::builder()
        .local(local())
        .subschema(SubschemaConfig::default().with_name("nowhere"))
        .build()
        .await;

    let Err(err) = result else {
        panic!("a subschema without executor cannot be stitched");
    };
    assert!(
        matches!(
            err,
            RebuildError::Introspection(IntrospectionError::MissingExecutor { .. })
        ),
        "{err}"
    );
}

#[test(tokio::test)]
async fn stopping_auto_refresh_is_idempotent() {
    let stitcher = Stitcher::builder().local(local()).build().await.unwrap();

    stitcher.stop_auto_refresh_remote_schemas();
    stitcher.stop_auto_refresh_remote_schemas();
    assert_eq!(stitcher.refresh_state(), RefreshState::Idle);

    stitcher.auto_refresh_remote_schemas(Some(Duration::from_secs(60)));
    assert_eq!(stitcher.refresh_state(), RefreshState::Armed);
    stitcher.stop_auto_refresh_remote_schemas();
    stitcher.stop_auto_refresh_remote_schemas();
    assert_eq!(stitcher.refresh_state(), RefreshState::Idle);
}

#[test(tokio::test)]
async fn auto_refresh_serves_the_updated_schema() {
    tokio::time::pause();
    let remote = remote().with_resolver("divide", |args| json!(int(args, "x") / int(args, "y")));
    let stitcher = Stitcher::builder()
        .local(local())
        .subschema(SubschemaConfig::new(remote.clone()))
        .build()
        .await
        .unwrap();

    stitcher.auto_refresh_remote_schemas(Some(Duration::from_millis(1000)));
    remote
        .replace("type Query { divide(x: Int, y: Int): Int }")
        .unwrap();
    tokio::time::sleep(Duration::from_millis(2000)).await;

    assert_eq!(query_fields(&stitcher), vec!["divide", "subtract"]);
    let response = query(&stitcher, "{ divide(x: 9, y: 3) }").await;
    assert_eq!(response.data, Some(json!({ "divide": 3 })));
    stitcher.stop_auto_refresh_remote_schemas();
}

#[test(tokio::test)]
async fn auto_refresh_without_any_interval_arms_nothing() {
    let stitcher = Stitcher::builder().local(local()).build().await.unwrap();
    stitcher.auto_refresh_remote_schemas(None);
    assert_eq!(stitcher.refresh_state(), RefreshState::Idle);
}

#[test(tokio::test)]
async fn yaml_configuration_drives_the_stitcher() {
    tokio::time::pause();
    let configuration: Configuration = r#"
polling_interval: 500ms
local_subschema:
  transforms:
    - rename_root_fields:
        prefix: local_
"#
    .parse()
    .unwrap();
    let remote = remote();
    let stitcher = Stitcher::builder()
        .configuration(configuration)
        .local(local())
        .subschema(SubschemaConfig::new(remote.clone()))
        .build()
        .await
        .unwrap();

    assert_eq!(stitcher.refresh_state(), RefreshState::Armed);
    assert_eq!(query_fields(&stitcher), vec!["add", "local_subtract"]);
    let response = query(&stitcher, "{ local_subtract(x: 4, y: 3) }").await;
    assert_eq!(response.data, Some(json!({ "local_subtract": 1 })));

    tokio::time::sleep(Duration::from_millis(1200)).await;
    // one introspection at startup, then one per elapsed interval
    assert_eq!(remote.introspection_count(), 3);
}

#[test(tokio::test)]
async fn mutations_are_delegated_in_order() {
    let local_sdl = "type Query { subtract(x: Int, y: Int): Int } type Mutation { store(value: Int): Int }";
    let local = LocalSubschema::parse(
        local_sdl,
        MockService::new(local_sdl)
            .unwrap()
            .with_resolver("store", |args| json!(int(args, "value"))),
    )
    .unwrap();
    let remote_sdl = "type Query { add(x: Int, y: Int): Int } type Mutation { double(value: Int): Int }";
    let remote = MockService::new(remote_sdl)
        .unwrap()
        .with_resolver("double", |args| json!(int(args, "value") * 2));
    let stitcher = Stitcher::builder()
        .local(local)
        .subschema(SubschemaConfig::new(remote))
        .build()
        .await
        .unwrap();

    let response = query(
        &stitcher,
        "mutation { first: double(value: 2) store(value: 3) second: double(value: 5) }",
    )
    .await;
    assert_eq!(
        response.data,
        Some(json!({ "first": 4, "store": 3, "second": 10 }))
    );
}

#[test(tokio::test)]
async fn federation_metadata_round_trip() {
    let local_sdl = "type Query { add(x: Int, y: Int): Int }";
    let local = LocalSubschema::parse(
        local_sdl,
        MockService::new(local_sdl)
            .unwrap()
            .with_resolver("add", |args| json!(int(args, "x") + int(args, "y"))),
    )
    .unwrap();
    let products = MockService::new(
        r#"type Query { product(upc: ID!): Product } type Product @key(fields: "upc") { upc: ID! name: String }"#,
    )
    .unwrap()
    .with_entity_resolver("Product", |representation| {
        json!({ "upc": representation.get("upc").cloned().unwrap_or(Value::Null), "name": "Table" })
    });
    let stitcher = Stitcher::builder()
        .configuration(Configuration::builder().federation_metadata(true).build())
        .local(local)
        .subschema(
            SubschemaConfig::new(products)
                .with_name("products")
                .with_introspection(IntrospectionKind::Federation),
        )
        .build()
        .await
        .unwrap();

    let response = query(&stitcher, "{ _service { sdl } }").await;
    let sdl = response
        .data
        .as_ref()
        .and_then(Value::as_object)
        .and_then(|data| data.get("_service"))
        .and_then(Value::as_object)
        .and_then(|service| service.get("sdl"))
        .and_then(Value::as_str)
        .unwrap()
        .to_string();
    assert!(sdl.contains("add(x: Int, y: Int): Int"), "{sdl}");
    assert!(sdl.contains("type Product"), "{sdl}");
    assert!(!sdl.contains("@key"), "{sdl}");
    assert!(!sdl.contains("_entities"), "{sdl}");
    assert!(!sdl.contains("_Any"), "{sdl}");
    assert!(!sdl.contains("_FieldSet"), "{sdl}");
    assert!(!sdl.contains("@link"), "{sdl}");
    assert!(!sdl.contains("link__"), "{sdl}");
    assert!(!sdl.contains("@shareable"), "{sdl}");

    let response = stitcher
        .execute(
            Request::builder()
                .query("query($r: [_Any!]!) { _entities(representations: $r) { ... on Product { upc name } } }")
                .variables(
                    json!({ "r": [
                        { "__typename": "Product", "upc": "1" },
                        { "__typename": "Unknown", "id": "2" },
                    ] })
                    .as_object()
                    .unwrap()
                    .clone(),
                )
                .build(),
        )
        .await;
    assert_eq!(
        response.data,
        Some(json!({ "_entities": [{ "upc": "1", "name": "Table" }, null] }))
    );
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].path, Some(json!(["_entities", 1])));
    assert_eq!(
        response.errors[0].extensions.get("code"),
        Some(&json!("ENTITY_NOT_RESOLVABLE"))
    );
}
