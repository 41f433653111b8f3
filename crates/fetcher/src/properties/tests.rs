use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};

use super::*;
use crate::config::FetchConfig;
use crate::source::{InMemorySource, SourceRegistry};

fn definitions() -> Arc<InMemorySource> {
    Arc::new(InMemorySource::from_values(
        "properties",
        vec![
            json!({"ID": 1, "IBLOCK_ID": 5, "ACTIVE": "Y", "SORT": 10, "CODE": "TITLE", "PROPERTY_TYPE": "S"}),
            json!({"ID": 2, "IBLOCK_ID": 5, "ACTIVE": "Y", "SORT": 20, "CODE": "IMG", "PROPERTY_TYPE": "F"}),
            json!({"ID": 3, "IBLOCK_ID": 5, "ACTIVE": "Y", "SORT": 30, "CODE": "TAGS", "PROPERTY_TYPE": "E", "MULTIPLE": "Y"}),
            json!({"ID": 4, "IBLOCK_ID": 5, "ACTIVE": "Y", "SORT": 40, "CODE": "AUTHOR", "PROPERTY_TYPE": "S", "USER_TYPE": "UserID"}),
            json!({"ID": 5, "IBLOCK_ID": 5, "ACTIVE": "Y", "SORT": 50, "CODE": "STATUS", "PROPERTY_TYPE": "L"}),
            json!({"ID": 6, "IBLOCK_ID": 5, "ACTIVE": "Y", "SORT": 60, "CODE": "CAT", "PROPERTY_TYPE": "G"}),
            json!({
                "ID": 7, "IBLOCK_ID": 5, "ACTIVE": "Y", "SORT": 70, "CODE": "COLOR", "PROPERTY_TYPE": "S",
                "USER_TYPE": "directory", "MULTIPLE": "Y", "USER_TYPE_SETTINGS": {"TABLE_NAME": "b_colors"}
            }),
            json!({"ID": 8, "IBLOCK_ID": 7, "ACTIVE": "Y", "SORT": 10, "CODE": "X", "PROPERTY_TYPE": "S"}),
        ],
    ))
}

fn values() -> Arc<InMemorySource> {
    Arc::new(
        InMemorySource::from_values(
            "values_5",
            vec![
                json!({
                    "ID": 100, "TITLE_VALUE": "First", "IMG_VALUE": "501", "TAGS_VALUE": "900",
                    "AUTHOR_VALUE": "1", "STATUS_VALUE": "31", "CAT_VALUE": "7", "COLOR_VALUE": "red"
                }),
                json!({
                    "ID": 100, "TITLE_VALUE": "First", "IMG_VALUE": "501", "TAGS_VALUE": "901",
                    "AUTHOR_VALUE": "1", "STATUS_VALUE": "31", "CAT_VALUE": "7", "COLOR_VALUE": "blue"
                }),
                json!({
                    "ID": 101, "TITLE_VALUE": "Second", "IMG_VALUE": null, "TAGS_VALUE": "901",
                    "AUTHOR_VALUE": "2", "STATUS_VALUE": "32", "COLOR_VALUE": "red"
                }),
            ],
        )
        .with_schema_id(5),
    )
}

fn source(name: &str, rows: Vec<Value>) -> Arc<InMemorySource> {
    Arc::new(InMemorySource::from_values(name, rows))
}

struct Resolvers {
    files: Arc<InMemorySource>,
    elements: Arc<InMemorySource>,
    users: Arc<InMemorySource>,
    enumerations: Arc<InMemorySource>,
    sections: Arc<InMemorySource>,
    colors: Arc<InMemorySource>,
}

impl Resolvers {
    fn new() -> Self {
        Self {
            files: source(
                "files",
                vec![json!({"ID": 501, "SUBDIR": "iblock/1", "FILE_NAME": "a.png", "CONTENT_TYPE": "image/png"})],
            ),
            elements: source(
                "elements",
                vec![json!({"ID": 900, "NAME": "Tag A"}), json!({"ID": 901, "NAME": "Tag B"})],
            ),
            users: source(
                "users",
                vec![json!({"ID": 1, "LOGIN": "ann", "ACTIVE": "Y"}), json!({"ID": 2, "LOGIN": "bob", "ACTIVE": "Y"})],
            ),
            enumerations: source(
                "enums",
                vec![json!({"ID": 31, "VALUE": "Draft"}), json!({"ID": 32, "VALUE": "Published"})],
            ),
            sections: source("sections", vec![json!({"ID": 7, "NAME": "News"})]),
            colors: source(
                "colors",
                vec![
                    json!({"UF_XML_ID": "red", "UF_NAME": "Red"}),
                    json!({"UF_XML_ID": "blue", "UF_NAME": "Blue"}),
                ],
            ),
        }
    }

    fn wire<D: ConfigureDispatch>(&self, dispatcher: D) -> D {
        dispatcher
            .use_files(self.files.clone())
            .use_linked_elements(["ID", "NAME"], self.elements.clone())
            .use_users(Vec::<String>::new(), self.users.clone())
            .use_enumerations(["ID", "VALUE"], self.enumerations.clone())
            .use_sections(["ID", "NAME"], self.sections.clone())
            .use_lookup_table("b_colors", ["UF_XML_ID", "UF_NAME"], Some(self.colors.clone()))
    }

    fn query_counts(&self) -> Vec<usize> {
        vec![
            self.files.query_count(),
            self.elements.query_count(),
            self.users.query_count(),
            self.enumerations.query_count(),
            self.sections.query_count(),
            self.colors.query_count(),
        ]
    }
}

fn hosts() -> RecordCollection {
    RecordCollection::from_values(vec![json!({"ID": 100, "IBLOCK_ID": 5}), json!({"ID": 101, "IBLOCK_ID": 5})])
}

fn all_properties(values: Arc<InMemorySource>) -> PropertySchemaDispatcher {
    PropertySchemaDispatcher::with_all_properties(values, "ID", "IBLOCK_ID", definitions()).unwrap()
}

#[test]
fn test_full_dispatch_resolves_every_kind() {
    let values = values();
    let resolvers = Resolvers::new();
    let dispatcher = resolvers.wire(all_properties(values.clone()));
    let mut collection = hosts();

    dispatcher.fill(&mut collection).unwrap();

    assert_eq!(values.query_count(), 1);
    assert_eq!(resolvers.query_counts(), vec![1; 6]);

    let first = collection.get(0).unwrap();
    assert_eq!(first.get("TITLE_VALUE"), Some(&json!("First")));
    assert_eq!(first.get("IMG_VALUE").unwrap()["FILE_NAME"], json!("a.png"));
    assert_eq!(
        first.get("TAGS_VALUE"),
        Some(&json!([{"ID": 900, "NAME": "Tag A"}, {"ID": 901, "NAME": "Tag B"}]))
    );
    assert_eq!(first.get("AUTHOR_VALUE").unwrap()["LOGIN"], json!("ann"));
    assert_eq!(first.get("STATUS_VALUE"), Some(&json!({"ID": 31, "VALUE": "Draft"})));
    assert_eq!(first.get("CAT_VALUE"), Some(&json!({"ID": 7, "NAME": "News"})));
    assert_eq!(
        first.get("COLOR_VALUE"),
        Some(&json!([{"UF_XML_ID": "red", "UF_NAME": "Red"}, {"UF_XML_ID": "blue", "UF_NAME": "Blue"}]))
    );
    assert_eq!(first.get("properties_info").unwrap().as_array().unwrap().len(), 7);

    let second = collection.get(1).unwrap();
    assert!(!second.contains("IMG_VALUE"));
    assert!(!second.contains("CAT_VALUE"));
    assert_eq!(second.get("TAGS_VALUE"), Some(&json!([{"ID": 901, "NAME": "Tag B"}])));
    assert_eq!(second.get("AUTHOR_VALUE").unwrap()["LOGIN"], json!("bob"));
    assert_eq!(second.get("COLOR_VALUE"), Some(&json!([{"UF_XML_ID": "red", "UF_NAME": "Red"}])));
}

#[test]
fn test_fill_key_keeps_values_in_a_bag() {
    let resolvers = Resolvers::new();
    let dispatcher = resolvers.wire(all_properties(values())).set_fill_key("PROPERTIES");
    let mut collection = hosts();

    dispatcher.fill(&mut collection).unwrap();

    let first = collection.get(0).unwrap();
    assert!(!first.contains("TITLE_VALUE"));
    let bag = first.get("PROPERTIES").unwrap();
    assert_eq!(bag["TITLE_VALUE"], json!("First"));
    assert_eq!(bag["IMG_VALUE"]["SUBDIR"], json!("iblock/1"));
    assert_eq!(bag["STATUS_VALUE"], json!({"ID": 31, "VALUE": "Draft"}));
    assert_eq!(bag["TAGS_VALUE"].as_array().unwrap().len(), 2);

    // File keys come from the IMG_VALUE entries of every bag
    let file_query = &resolvers.files.queries()[0];
    assert_eq!(file_query.filters[0].value, json!([501]));
}

#[test]
fn test_unwired_kinds_keep_stored_values() {
    let resolvers = Resolvers::new();
    let dispatcher = all_properties(values()).use_files(resolvers.files.clone());
    let mut collection = hosts();

    dispatcher.fill(&mut collection).unwrap();

    let first = collection.get(0).unwrap();
    assert_eq!(first.get("IMG_VALUE").unwrap()["ID"], json!(501));
    assert_eq!(first.get("TAGS_VALUE"), Some(&json!(["900", "901"])));
    assert_eq!(first.get("COLOR_VALUE"), Some(&json!(["red", "blue"])));
    assert_eq!(resolvers.query_counts(), vec![1, 0, 0, 0, 0, 0]);
}

#[test]
fn test_explicit_columns_without_definitions() {
    let values = values();
    let dispatcher = PropertySchemaDispatcher::new(values.clone(), ["TITLE_VALUE", "TAGS_VALUE"], "ID");
    let mut collection = hosts();

    dispatcher.fill(&mut collection).unwrap();

    assert_eq!(values.queries()[0].select, vec!["ID", "TITLE_VALUE", "TAGS_VALUE"]);
    let first = collection.get(0).unwrap();
    assert_eq!(first.get("TAGS_VALUE"), Some(&json!(["900", "901"])));
    assert!(!first.contains("STATUS_VALUE"));
    assert_eq!(collection.get(1).unwrap().get("TAGS_VALUE"), Some(&json!("901")));
}

#[test]
fn test_declared_multiple_names_keep_lists() {
    let dispatcher = PropertySchemaDispatcher::new(values(), ["TITLE_VALUE"], "ID").set_multiple_prop_names(["TITLE"]);
    let mut collection = hosts();

    dispatcher.fill(&mut collection).unwrap();
    assert_eq!(collection.get(0).unwrap().get("TITLE_VALUE"), Some(&json!(["First"])));
}

#[test]
fn test_single_value_of_multiple_property_stays_scalar() {
    let definitions = source(
        "properties",
        vec![json!({"ID": 1, "IBLOCK_ID": 11, "ACTIVE": "Y", "CODE": "NOTE", "PROPERTY_TYPE": "S", "MULTIPLE": "Y"})],
    );
    let values = Arc::new(
        InMemorySource::from_values(
            "values_11",
            vec![
                json!({"ID": 1, "NOTE_VALUE": "x"}),
                json!({"ID": 2, "NOTE_VALUE": "a"}),
                json!({"ID": 2, "NOTE_VALUE": "b"}),
            ],
        )
        .with_schema_id(11),
    );
    let mut collection = RecordCollection::from_values(vec![json!({"ID": 1}), json!({"ID": 2})]);

    PropertySchemaDispatcher::with_all_properties(values, "ID", "IBLOCK_ID", definitions)
        .unwrap()
        .fill(&mut collection)
        .unwrap();

    assert_eq!(collection.get(0).unwrap().get("NOTE_VALUE"), Some(&json!("x")));
    assert_eq!(collection.get(1).unwrap().get("NOTE_VALUE"), Some(&json!(["a", "b"])));
}

#[test]
fn test_user_columns_outside_the_model_survive() {
    let users = source(
        "users",
        vec![json!({"ID": 1, "LOGIN": "ann", "WORK_POSITION": "CTO", "UF_DEPARTMENT": [4]})],
    );
    let dispatcher = all_properties(values()).use_users(["ID", "LOGIN", "WORK_POSITION", "UF_DEPARTMENT"], users.clone());
    let mut collection = hosts();

    dispatcher.fill(&mut collection).unwrap();

    assert_eq!(users.queries()[0].select, vec!["ID", "LOGIN", "WORK_POSITION", "UF_DEPARTMENT"]);
    let author = collection.get(0).unwrap().get("AUTHOR_VALUE").unwrap();
    assert_eq!(
        author,
        &json!({"ID": 1, "LOGIN": "ann", "WORK_POSITION": "CTO", "UF_DEPARTMENT": [4]})
    );
    assert!(author.get("ACTIVE").is_none());
    assert!(author.get("EMAIL").is_none());
}

fn directory(id: i64, code: &str, table: &str) -> Value {
    json!({
        "ID": id, "IBLOCK_ID": 12, "ACTIVE": "Y", "SORT": id, "CODE": code, "PROPERTY_TYPE": "S",
        "USER_TYPE": "directory", "USER_TYPE_SETTINGS": {"TABLE_NAME": table}
    })
}

#[test]
fn test_one_query_per_lookup_table() {
    let definitions = source(
        "properties",
        vec![
            directory(1, "COLOR", "b_colors"),
            directory(2, "TONE", "b_colors"),
            directory(3, "SHAPE", "b_shapes"),
        ],
    );
    let values = Arc::new(
        InMemorySource::from_values(
            "values_12",
            vec![
                json!({"ID": 1, "COLOR_VALUE": "red", "TONE_VALUE": "blue", "SHAPE_VALUE": "round"}),
                json!({"ID": 2, "COLOR_VALUE": "blue", "TONE_VALUE": "red", "SHAPE_VALUE": "square"}),
            ],
        )
        .with_schema_id(12),
    );
    let colors = Resolvers::new().colors;
    let shapes = source(
        "shapes",
        vec![
            json!({"UF_XML_ID": "round", "UF_NAME": "Round"}),
            json!({"UF_XML_ID": "square", "UF_NAME": "Square"}),
        ],
    );
    let mut collection = RecordCollection::from_values(vec![json!({"ID": 1}), json!({"ID": 2})]);

    PropertySchemaDispatcher::with_all_properties(values, "ID", "IBLOCK_ID", definitions)
        .unwrap()
        .use_lookup_table("b_colors", Vec::<String>::new(), Some(colors.clone()))
        .use_lookup_table("b_shapes", Vec::<String>::new(), Some(shapes.clone()))
        .fill(&mut collection)
        .unwrap();

    assert_eq!(colors.query_count(), 1);
    assert_eq!(colors.queries()[0].filters[0].value_count(), 2);
    assert_eq!(shapes.query_count(), 1);

    let second = collection.get(1).unwrap();
    assert_eq!(second.get("COLOR_VALUE").unwrap()["UF_NAME"], json!("Blue"));
    assert_eq!(second.get("TONE_VALUE").unwrap()["UF_NAME"], json!("Red"));
    assert_eq!(second.get("SHAPE_VALUE").unwrap()["UF_NAME"], json!("Square"));
}

#[test]
fn test_compare_and_modify_callbacks() {
    let dispatcher = PropertySchemaDispatcher::new(values(), ["TITLE_VALUE"], "ID")
        .compare_with(|_, row| row["TITLE_VALUE"] == json!("SECOND"))
        .modify_with(|mut row| {
            if let Some(Value::String(title)) = row.get_mut("TITLE_VALUE") {
                *title = title.to_uppercase();
            }
            row
        });
    let mut collection = hosts();

    dispatcher.fill(&mut collection).unwrap();

    for record in &collection {
        assert_eq!(record.get("TITLE_VALUE"), Some(&json!("SECOND")));
    }
}

#[test]
fn test_value_columns_are_chunked() {
    let values = values();
    let dispatcher = all_properties(values.clone())
        .with_config(FetchConfig::default().with_max_select_fields(3))
        .unwrap();
    let mut collection = hosts();

    dispatcher.fill(&mut collection).unwrap();

    assert_eq!(values.query_count(), 3);
    let first = collection.get(0).unwrap();
    assert_eq!(first.get("TITLE_VALUE"), Some(&json!("First")));
    assert_eq!(first.get("COLOR_VALUE"), Some(&json!(["red", "blue"])));
    assert_eq!(first.get("TAGS_VALUE"), Some(&json!(["900", "901"])));
}

#[test]
fn test_invalid_config_is_rejected() {
    let err = all_properties(values())
        .with_config(FetchConfig::default().with_max_select_fields(0))
        .unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_source_without_schema_is_not_found() {
    let unbound = source("values", Vec::new());
    let err = PropertySchemaDispatcher::with_all_properties(unbound, "ID", "IBLOCK_ID", definitions()).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_lookup_table_resolved_through_registry() {
    let colors = Resolvers::new().colors;
    let built = Arc::new(AtomicUsize::new(0));
    let registry = {
        let colors: SharedSource = colors.clone();
        let built = Arc::clone(&built);
        SourceRegistry::new("lookup table").with_factory(move |table| {
            assert_eq!(table, &json!("b_colors"));
            built.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::clone(&colors))
        })
    };
    let dispatcher = all_properties(values())
        .use_lookup_table("b_colors", Vec::<String>::new(), None)
        .with_lookup_registry(registry);

    dispatcher.fill(&mut hosts()).unwrap();
    dispatcher.fill(&mut hosts()).unwrap();

    assert_eq!(built.load(Ordering::SeqCst), 1);
    assert_eq!(colors.query_count(), 2);
}

#[test]
fn test_lookup_table_without_source_is_not_found() {
    let dispatcher = all_properties(values()).use_lookup_table("b_colors", Vec::<String>::new(), None);
    let mut collection = hosts();

    let err = dispatcher.fill(&mut collection).unwrap_err();
    assert!(err.is_not_found());
    // Values were attached before the failing resolver ran
    assert_eq!(collection.get(0).unwrap().get("TITLE_VALUE"), Some(&json!("First")));
}

#[test]
fn test_empty_collection_is_a_noop() {
    let values = values();
    let definitions = definitions();
    let dispatcher = PropertySchemaDispatcher::with_all_properties(values.clone(), "ID", "IBLOCK_ID", definitions.clone())
        .unwrap();

    dispatcher.fill(&mut RecordCollection::default()).unwrap();
    assert_eq!(values.query_count() + definitions.query_count(), 0);
}

#[test]
fn test_schema_without_properties_is_a_noop() {
    let values = Arc::new(InMemorySource::new("values_9", Vec::new()).with_schema_id(9));
    let dispatcher = all_properties(values.clone());
    let mut collection = RecordCollection::from_values(vec![json!({"ID": 1, "IBLOCK_ID": 9})]);

    dispatcher.fill(&mut collection).unwrap();
    assert_eq!(values.query_count(), 0);
}

fn group_values_7() -> Arc<InMemorySource> {
    Arc::new(InMemorySource::from_values("values_7", vec![json!({"ID": 200, "X_VALUE": "x"})]).with_schema_id(7))
}

fn mixed_hosts() -> RecordCollection {
    RecordCollection::from_values(vec![
        json!({"ID": 100, "IBLOCK_ID": 5}),
        json!({"ID": 200, "IBLOCK_ID": 7}),
        json!({"ID": 101, "IBLOCK_ID": 5}),
        json!({"ID": 300}),
    ])
}

#[test]
fn test_group_dispatch_keeps_schemas_apart() {
    let dispatcher = GroupPartitionedDispatcher::new("IBLOCK_ID", "ID", definitions())
        .with_group_source(5, values())
        .with_group_source(7, group_values_7());
    let mut collection = mixed_hosts();

    dispatcher.fill(&mut collection).unwrap();

    let ids: Vec<Value> = collection.iter().map(|record| record.get("ID").cloned().unwrap()).collect();
    assert_eq!(ids, vec![json!(100), json!(200), json!(101), json!(300)]);

    let first = collection.get(0).unwrap();
    assert_eq!(first.get("TITLE_VALUE"), Some(&json!("First")));
    assert!(!first.contains("X_VALUE"));

    let other = collection.get(1).unwrap();
    assert_eq!(other.get("X_VALUE"), Some(&json!("x")));
    assert!(!other.contains("TITLE_VALUE"));
    assert_eq!(other.get("properties_info").unwrap().as_array().unwrap().len(), 1);

    assert_eq!(collection.get(3).unwrap().fields().len(), 1);
}

#[test]
fn test_group_dispatch_propagates_wiring() {
    let resolvers = Resolvers::new();
    let dispatcher = resolvers
        .wire(GroupPartitionedDispatcher::new("IBLOCK_ID", "ID", definitions()))
        .with_group_source(5, values())
        .with_group_source(7, group_values_7())
        .set_fill_key("PROPS");
    let mut collection = mixed_hosts();

    dispatcher.fill(&mut collection).unwrap();

    assert_eq!(collection.get(0).unwrap().get("PROPS").unwrap()["CAT_VALUE"]["NAME"], json!("News"));
    assert_eq!(collection.get(1).unwrap().get("PROPS"), Some(&json!({"X_VALUE": "x"})));
    assert_eq!(resolvers.query_counts(), vec![1; 6]);
}

#[test]
fn test_group_sources_are_built_once() {
    let built = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&built);
    let dispatcher = GroupPartitionedDispatcher::new("IBLOCK_ID", "ID", definitions()).with_source_factory(
        move |group| {
            counter.fetch_add(1, Ordering::SeqCst);
            let source: SharedSource = if group == &json!(5) { values() } else { group_values_7() };
            Ok(source)
        },
    );

    dispatcher.fill(&mut mixed_hosts()).unwrap();
    dispatcher.fill(&mut mixed_hosts()).unwrap();

    assert_eq!(built.load(Ordering::SeqCst), 2);
}

#[test]
fn test_group_failure_stops_and_restores_order() {
    let failing = Arc::new(InMemorySource::new("values_5", Vec::new()).with_failure("offline"));
    let dispatcher = GroupPartitionedDispatcher::new("IBLOCK_ID", "ID", definitions())
        .with_group_source(7, group_values_7())
        .with_group_source(5, failing);
    let mut collection = RecordCollection::from_values(vec![
        json!({"ID": 200, "IBLOCK_ID": 7}),
        json!({"ID": 100, "IBLOCK_ID": 5}),
    ]);

    let err = dispatcher.fill(&mut collection).unwrap_err();

    assert!(matches!(err, crate::error::FetchError::Source(_)));
    assert_eq!(collection.len(), 2);
    assert_eq!(collection.get(0).unwrap().get("X_VALUE"), Some(&json!("x")));
    assert_eq!(collection.get(1).unwrap().get("ID"), Some(&json!(100)));
}

#[test]
fn test_unknown_group_is_not_found() {
    let dispatcher = GroupPartitionedDispatcher::new("IBLOCK_ID", "ID", definitions()).with_group_source(5, values());
    let err = dispatcher.fill(&mut mixed_hosts()).unwrap_err();
    assert!(err.is_not_found());
}
