use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use cypher_graphql::*;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::VecDeque;

const TYPE_DEFS: &str = r#"
    type Movie {
        title: String!
        views: BigInt
        released: Date
        actors: [Actor!]! @relationship(type: "ACTED_IN", direction: IN)
        credits: [Credit!]! @relationship(type: "CREDITED", direction: OUT)
        director: Person @relationship(type: "DIRECTED", direction: IN)
    }
    type Actor {
        name: String!
    }
    type Person {
        name: String!
    }
    union Credit = Actor | Person
"#;

/// Answers statements from a queue and remembers what it was asked to run
#[derive(Default)]
struct ScriptedDriver {
    responses: RefCell<VecDeque<Result<QueryResult, DriverError>>>,
    statements: RefCell<Vec<RootTranslation>>,
}

impl ScriptedDriver {
    fn new(responses: Vec<Result<QueryResult, DriverError>>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            statements: RefCell::new(vec![]),
        }
    }

    fn rows(rows: Vec<Value>) -> Result<QueryResult, DriverError> {
        Ok(QueryResult {
            rows: rows
                .into_iter()
                .map(|x| match x {
                    Value::Object(kv) => kv,
                    _ => panic!("rows must be objects"),
                })
                .collect(),
            ..Default::default()
        })
    }
}

impl GraphDriver for ScriptedDriver {
    fn run(&self, statement: &RootTranslation) -> Result<QueryResult, DriverError> {
        self.statements.borrow_mut().push(statement.clone());
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok(QueryResult::default()))
    }
}

#[derive(Default)]
struct RecordingSink {
    events: RefCell<Vec<SubscriptionEvent>>,
}

impl EventSink for RecordingSink {
    fn publish(&self, event: &SubscriptionEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn schema(subscriptions: bool) -> GraphQLSchema {
    init_tracing();
    let mut config = Config::default();
    config.features.subscriptions = subscriptions;
    GraphQLSchema::new(TYPE_DEFS, config).unwrap()
}

fn cursor(offset: i64) -> String {
    BASE64.encode(format!("arrayconnection:{}", offset))
}

fn to_json(response: &GraphQLResponse) -> Value {
    serde_json::to_value(response).unwrap()
}

fn edges(count: usize) -> Value {
    Value::Array(
        (0..count)
            .map(|ix| json!({"node": {"title": format!("Movie {}", ix)}}))
            .collect(),
    )
}

#[test]
fn last_page_after_a_cursor() {
    let driver = ScriptedDriver::new(vec![ScriptedDriver::rows(vec![json!({
        "this": {"edges": edges(7), "totalCount": 27}
    })])]);
    let query = format!(
        r#"{{ moviesConnection(first: 20, after: "{}") {{ totalCount edges {{ cursor node {{ title }} }} pageInfo {{ hasNextPage hasPreviousPage startCursor endCursor }} }} }}"#,
        cursor(19)
    );
    let response = to_json(&schema(false).execute(&driver, &query, None, None, None, None));
    let connection = &response["data"]["moviesConnection"];
    assert_eq!(connection["totalCount"], json!(27));
    assert_eq!(connection["edges"].as_array().unwrap().len(), 7);
    assert_eq!(connection["edges"][0]["cursor"], json!(cursor(20)));
    assert_eq!(connection["edges"][6]["node"]["title"], json!("Movie 6"));
    assert_eq!(
        connection["pageInfo"],
        json!({"hasNextPage": false, "hasPreviousPage": true, "startCursor": cursor(20), "endCursor": cursor(26)})
    );

    let statements = driver.statements.borrow();
    assert!(statements[0].cypher.contains("SKIP $param"));
    assert!(statements[0].params.values().any(|x| *x == json!({"low": 20, "high": 0})));
}

#[test]
fn first_page_reports_more_edges() {
    let driver = ScriptedDriver::new(vec![ScriptedDriver::rows(vec![json!({
        "this": {"edges": edges(20), "totalCount": 27}
    })])]);
    let response = to_json(&schema(false).execute(
        &driver,
        "{ moviesConnection(first: 20) { edges { cursor } pageInfo { hasNextPage endCursor } } }",
        None,
        None,
        None,
        None,
    ));
    let connection = &response["data"]["moviesConnection"];
    assert_eq!(connection["edges"][0]["cursor"], json!(cursor(0)));
    assert_eq!(connection["pageInfo"], json!({"hasNextPage": true, "endCursor": cursor(19)}));
    assert!(!driver.statements.borrow()[0].cypher.contains("SKIP"));
}

#[test]
fn unpaged_connection_returns_every_edge() {
    let driver = ScriptedDriver::new(vec![ScriptedDriver::rows(vec![json!({
        "this": {"edges": edges(27), "totalCount": 27}
    })])]);
    let response = to_json(&schema(false).execute(
        &driver,
        "{ moviesConnection { totalCount edges { node { title } } pageInfo { hasNextPage } } }",
        None,
        None,
        None,
        None,
    ));
    let connection = &response["data"]["moviesConnection"];
    assert_eq!(connection["edges"].as_array().unwrap().len(), 27);
    assert_eq!(connection["pageInfo"]["hasNextPage"], json!(false));
    assert!(!driver.statements.borrow()[0].cypher.contains("LIMIT"));
}

#[test]
fn mutation_info_comes_from_driver_counters() {
    let driver = ScriptedDriver::new(vec![Ok(QueryResult {
        rows: vec![json!({"data": [{"title": "Matrix"}]}).as_object().unwrap().clone()],
        counters: Counters {
            nodes_created: 2,
            relationships_created: 1,
            ..Default::default()
        },
        bookmark: Some("bm:1".to_string()),
    })]);
    let response = to_json(&schema(false).execute(
        &driver,
        r#"mutation { createMovies(input: [{title: "Matrix", actors: {create: [{node: {name: "Keanu"}}]}}]) { info { nodesCreated relationshipsCreated bookmark } movies { title } } }"#,
        None,
        None,
        None,
        None,
    ));
    assert_eq!(
        response,
        json!({"data": {"createMovies": {
            "info": {"nodesCreated": 2, "relationshipsCreated": 1, "bookmark": "bm:1"},
            "movies": [{"title": "Matrix"}]
        }}})
    );
}

#[test]
fn events_are_published_after_success() {
    let event = json!({
        "event": "delete",
        "id": {"low": 4, "high": 0},
        "typename": "Movie",
        "timestamp": 1700000000000i64,
        "properties": {"old": {"title": "Matrix"}, "new": null}
    });
    let driver = ScriptedDriver::new(vec![ScriptedDriver::rows(vec![json!({"meta": [event]})])]);
    let sink = RecordingSink::default();
    let response = to_json(&schema(true).execute(
        &driver,
        r#"mutation { deleteMovies(where: {title: "Matrix"}) { nodesDeleted } }"#,
        None,
        None,
        None,
        Some(&sink),
    ));
    assert_eq!(response, json!({"data": {"deleteMovies": {"nodesDeleted": 0}}}));
    let events = sink.events.borrow();
    assert_eq!(events.len(), 1);
    match &events[0] {
        SubscriptionEvent::Delete(x) => {
            assert_eq!(x.id, 4);
            assert_eq!(x.typename, "Movie");
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(driver.statements.borrow()[0].cypher.contains("AS meta"));
}

#[test]
fn failed_statements_publish_nothing() {
    let driver = ScriptedDriver::new(vec![Err(DriverError::new("connection reset"))]);
    let sink = RecordingSink::default();
    let response = to_json(&schema(true).execute(
        &driver,
        r#"mutation { deleteMovies { nodesDeleted } }"#,
        None,
        None,
        None,
        Some(&sink),
    ));
    assert_eq!(response["data"], Value::Null);
    assert_eq!(response["errors"][0]["extensions"]["code"], json!("INTERNAL_SERVER_ERROR"));
    assert!(sink.events.borrow().is_empty());
}

#[test]
fn guard_failures_are_classified() {
    let forbidden = ScriptedDriver::new(vec![Err(DriverError::new(
        "Failed to invoke procedure `apoc.util.validate`: Caused by: java.lang.RuntimeException: @neo4j/graphql/FORBIDDEN",
    ))]);
    let response = to_json(&schema(false).execute(&forbidden, "{ movies { title } }", None, None, None, None));
    assert_eq!(response["errors"][0]["message"], json!("Forbidden"));
    assert_eq!(response["errors"][0]["extensions"]["code"], json!("FORBIDDEN"));

    let cardinality = ScriptedDriver::new(vec![Err(DriverError::new(
        "Failed to invoke function `apoc.util.validatePredicate`: Caused by: java.lang.RuntimeException: @neo4j/graphql/RELATIONSHIP-REQUIREDMovie.director must not occur more than once",
    ))]);
    let response = to_json(&schema(false).execute(
        &cardinality,
        r#"mutation { updateMovies(update: {title: "B"}) { movies { title } } }"#,
        None,
        None,
        None,
        None,
    ));
    assert_eq!(
        response["errors"][0]["message"],
        json!("Movie.director must not occur more than once")
    );
    assert_eq!(response["errors"][0]["extensions"]["code"], json!("RELATIONSHIP_REQUIRED"));
}

#[test]
fn big_integers_are_returned_as_strings() {
    let driver = ScriptedDriver::new(vec![ScriptedDriver::rows(vec![
        json!({"this": {"title": "A", "views": {"low": 1, "high": 2097152}, "released": "1999-03-31"}}),
        json!({"this": {"title": "B", "views": null, "released": null}}),
    ])]);
    let response = to_json(&schema(false).execute(
        &driver,
        "{ movies { title views released } }",
        None,
        None,
        None,
        None,
    ));
    assert_eq!(
        response["data"]["movies"],
        json!([
            {"title": "A", "views": "9007199254740993", "released": "1999-03-31"},
            {"title": "B", "views": null, "released": null}
        ])
    );
}

#[test]
fn union_members_resolve_by_label() {
    let driver = ScriptedDriver::new(vec![ScriptedDriver::rows(vec![json!({"this": {
        "title": "Matrix",
        "credits": [
            {"__resolveType": "Person", "name": "Lana"},
            {"__resolveType": "Actor", "name": "Keanu"}
        ]
    }})])]);
    let response = to_json(&schema(false).execute(
        &driver,
        "{ movies { title credits { __typename ... on Actor { name } ... on Person { name } } } }",
        None,
        None,
        None,
        None,
    ));
    assert_eq!(
        response["data"]["movies"][0]["credits"],
        json!([
            {"__typename": "Person", "name": "Lana"},
            {"__typename": "Actor", "name": "Keanu"}
        ])
    );
    let cypher = &driver.statements.borrow()[0].cypher;
    assert!(cypher.contains("__resolveType: \"Actor\""));
    assert!(cypher.contains("__resolveType: \"Person\""));
}

#[test]
fn typename_needs_no_statement() {
    let driver = ScriptedDriver::default();
    let response = to_json(&schema(false).execute(&driver, "{ __typename }", None, None, None, None));
    assert_eq!(response, json!({"data": {"__typename": "Query"}}));
    assert!(driver.statements.borrow().is_empty());
}

#[test]
fn root_fields_translate_in_order() {
    let translations = schema(false)
        .translate(
            "query Pick($title: String = \"Matrix\") { first: movies(where: {title: $title}) { title } moviesAggregate { count } }",
            None,
            Some("Pick"),
            None,
        )
        .unwrap();
    assert_eq!(translations.len(), 2);
    assert_eq!(translations[0].response_key, "first");
    assert_eq!(translations[0].field_name, "movies");
    assert_eq!(translations[0].kind, RootKind::Read);
    assert_eq!(translations[0].params["param0"], json!("Matrix"));
    assert_eq!(translations[1].kind, RootKind::Aggregate);
}

#[test]
fn operation_selection_errors() {
    let schema = schema(false);
    let mixed = schema.translate("query A { movies { title } } { actors { name } }", None, None, None);
    assert_eq!(
        mixed.unwrap_err(),
        GraphQLError::translation("Anonymous operations must be the only defined operation")
    );
    let missing = schema.translate("query A { movies { title } }", None, Some("B"), None);
    assert_eq!(missing.unwrap_err(), GraphQLError::translation("Operation not found"));
    let parse = schema.translate("{ movies { title }", None, None, None);
    assert!(matches!(parse, Err(GraphQLError::Parse(_))));
}

#[test]
fn parse_errors_omit_data() {
    let driver = ScriptedDriver::default();
    let response = to_json(&schema(false).execute(&driver, "{ movies {", None, None, None, None));
    assert!(response.get("data").is_none());
    assert_eq!(response["errors"][0]["extensions"]["code"], json!("GRAPHQL_PARSE_FAILED"));
}

#[test]
fn populated_by_callbacks_receive_the_input() {
    init_tracing();
    let mut schema = GraphQLSchema::new(
        r#"
        type Post {
            title: String!
            slug: String! @populatedBy(callback: "slug", operations: [CREATE])
        }
        "#,
        Config::default(),
    )
    .unwrap();
    schema.register_callback("slug", |input| {
        json!(input["title"].as_str().unwrap_or_default().to_lowercase().replace(' ', "-"))
    });
    let translation = schema
        .translate(r#"mutation { createPosts(input: [{title: "Hello World"}]) { posts { slug } } }"#, None, None, None)
        .unwrap()
        .remove(0);
    assert!(translation.cypher.contains("SET this0.title = $param0, this0.slug = $param1"));
    assert_eq!(translation.params["param1"], json!("hello-world"));
}

#[test]
fn offset_and_limit_are_bound_as_integers() {
    let rows = (0..7).map(|ix| json!({"this": {"title": format!("Movie {}", ix)}})).collect();
    let driver = ScriptedDriver::new(vec![ScriptedDriver::rows(rows)]);
    let response = to_json(&schema(false).execute(
        &driver,
        "{ movies(options: {offset: 20, limit: 40}) { title } }",
        None,
        None,
        None,
        None,
    ));
    assert_eq!(response["data"]["movies"].as_array().unwrap().len(), 7);
    let statement = &driver.statements.borrow()[0];
    assert!(statement.cypher.contains("SKIP $param0\nLIMIT $param1"));
    assert_eq!(statement.params["param0"], json!({"low": 20, "high": 0}));
    assert_eq!(statement.params["param1"], json!({"low": 40, "high": 0}));
}

#[test]
fn union_creates_dispatch_per_member() {
    let translation = schema(true)
        .translate(
            r#"mutation {
                createMovies(input: [{
                    title: "Matrix"
                    credits: {
                        Actor: {create: [{node: {name: "Keanu"}}]}
                        Person: {create: [{node: {name: "Lana"}}]}
                    }
                }]) { movies { title } }
            }"#,
            None,
            None,
            None,
        )
        .unwrap()
        .remove(0);
    let cypher = &translation.cypher;
    assert_eq!(cypher.matches("-[edge").count(), 2);
    assert!(cypher.contains(":CREDITED]->("));
    assert!(cypher.contains("fromTypename: \"Movie\", toTypename: \"Actor\""));
    assert!(cypher.contains("fromTypename: \"Movie\", toTypename: \"Person\""));
    assert!(cypher.contains("AS meta"));
}

const MANDATE_TYPE_DEFS: &str = r#"
    type Mandate {
        number: String!
        price: Float!
        valuation: Valuation! @relationship(type: "HAS_VALUATION", direction: OUT)
    }
    type Valuation {
        currency: String
        estate: Estate! @relationship(type: "VALUATION_FOR", direction: OUT)
    }
    type Estate {
        area: Float!
        floor: Int!
        address: Address! @relationship(type: "HAS_ADDRESS", direction: OUT)
    }
    type Address {
        street: String!
        postalCode: PostalCode! @relationship(type: "HAS_POSTAL_CODE", direction: OUT)
    }
    type PostalCode {
        number: String!
    }
"#;

const MANDATE_FILTER: &str = r#"{
    mandates(where: {
        price_GTE: 250000.5
        valuation: { estate: { area_GTE: 80.5, floor_GTE: 2, address: { postalCode: { number_IN: ["13001", "13002"] } } } }
    }) { number }
}"#;

fn mandate_schema() -> GraphQLSchema {
    init_tracing();
    GraphQLSchema::new(MANDATE_TYPE_DEFS, Config::default()).unwrap()
}

#[test]
fn filters_follow_several_hops() {
    let translation = mandate_schema().translate(MANDATE_FILTER, None, None, None).unwrap().remove(0);
    assert!(translation.cypher.contains(
        "WHERE (this.price >= $param0) AND (EXISTS { MATCH (this)-[edge1:HAS_VALUATION]->(this0) WHERE (this0:Valuation) AND \
         (EXISTS { MATCH (this0)-[edge3:VALUATION_FOR]->(this2) WHERE (this2:Estate) AND \
         ((this2.area >= $param1) AND (this2.floor >= $param2) AND \
         (EXISTS { MATCH (this2)-[edge5:HAS_ADDRESS]->(this4) WHERE (this4:Address) AND \
         (EXISTS { MATCH (this4)-[edge7:HAS_POSTAL_CODE]->(this6) WHERE (this6:PostalCode) AND (this6.number IN $param3) }) })) }) })"
    ));
    assert_eq!(translation.params["param0"], json!(250000.5));
    assert_eq!(translation.params["param1"], json!(80.5));
    assert_eq!(translation.params["param2"], json!(2));
    assert_eq!(translation.params["param3"], json!(["13001", "13002"]));
    assert_eq!(translation.params.len(), 4);
}

#[test]
fn nested_creates_link_every_hop_before_checking_cardinality() {
    let translation = mandate_schema()
        .translate(
            r#"mutation {
                createMandates(input: [{
                    number: "M-1"
                    price: 300000.0
                    valuation: { create: { node: { estate: { create: { node: {
                        area: 92.0
                        floor: 3
                        address: { create: { node: { street: "Rue Paradis", postalCode: { create: { node: { number: "13001" } } } } } }
                    } } } } } }
                }]) { mandates { number } }
            }"#,
            None,
            None,
            None,
        )
        .unwrap()
        .remove(0);
    let cypher = &translation.cypher;
    for pattern in [
        "CREATE (this0)-[edge2:HAS_VALUATION]->(this1)",
        "CREATE (this1)-[edge4:VALUATION_FOR]->(this3)",
        "CREATE (this3)-[edge6:HAS_ADDRESS]->(this5)",
        "CREATE (this5)-[edge8:HAS_POSTAL_CODE]->(this7)",
    ] {
        assert!(cypher.contains(pattern), "missing {}", pattern);
    }
    let linked = cypher.find("CREATE (this0)-[edge2:HAS_VALUATION]->(this1)").unwrap();
    let checked = cypher.find("Mandate.valuation required exactly once").unwrap();
    assert!(linked < checked);
}

#[test]
fn nested_filters_match_every_mandate() {
    let rows = (0..27)
        .map(|ix| json!({"this": {"number": format!("M-{}", ix)}}))
        .collect();
    let driver = ScriptedDriver::new(vec![ScriptedDriver::rows(rows)]);
    let response = to_json(&mandate_schema().execute(&driver, MANDATE_FILTER, None, None, None, None));
    assert!(response.get("errors").is_none());
    let mandates = response["data"]["mandates"].as_array().unwrap();
    assert_eq!(mandates.len(), 27);
    assert_eq!(mandates[26], json!({"number": "M-26"}));
    assert!(driver.statements.borrow()[0].cypher.contains("this6.number IN $param3"));
}
