use isometry_core::db::open_db_in_memory;
use isometry_core::error::{CoreError, ValidationError};
use isometry_core::facets::cache::FacetCache;
use isometry_core::facets::discovery::{discover_facets, FacetQueryOptions};
use isometry_core::model::facet::facet_columns;
use rusqlite::{params, Connection};
use std::time::Duration;

#[test]
fn every_catalog_column_is_discoverable() {
    let conn = open_db_in_memory().unwrap();
    insert_item(&conn, "only", Some("work"), r#"["alpha"]"#);

    for column in facet_columns() {
        let options = FacetQueryOptions::for_column(column.name);
        let facets = discover_facets(&conn, column.name, &options)
            .unwrap_or_else(|err| panic!("discovery failed for {}: {err}", column.name));
        assert!(facets.iter().all(|facet| facet.count == 1), "{}", column.name);
    }
}

#[test]
fn folders_are_ordered_by_count_then_value() {
    let conn = open_db_in_memory().unwrap();
    let mut next = 0;
    for (folder, count) in [("work", 5), ("personal", 3), ("archive", 3)] {
        for _ in 0..count {
            insert_item(&conn, &format!("i{next}"), Some(folder), "[]");
            next += 1;
        }
    }

    let facets = discover_facets(&conn, "folder", &FacetQueryOptions::default()).unwrap();
    let listed: Vec<(&str, u64)> = facets
        .iter()
        .map(|facet| (facet.value.as_str(), facet.count))
        .collect();
    assert_eq!(listed, vec![("work", 5), ("archive", 3), ("personal", 3)]);
}

#[test]
fn null_blank_and_deleted_values_are_skipped() {
    let conn = open_db_in_memory().unwrap();
    insert_item(&conn, "a", Some("work"), "[]");
    insert_item(&conn, "b", None, "[]");
    insert_item(&conn, "c", Some("   "), "[]");
    insert_item(&conn, "d", Some("trash"), "[]");
    conn.execute("UPDATE items SET deleted_at = 1 WHERE id = 'd';", [])
        .unwrap();

    let facets = discover_facets(&conn, "folder", &FacetQueryOptions::default()).unwrap();
    assert_eq!(facets.len(), 1);
    assert_eq!(facets[0].value, "work");
}

#[test]
fn multi_select_explodes_json_lists() {
    let conn = open_db_in_memory().unwrap();
    insert_item(&conn, "a", None, r#"["rust", "sqlite"]"#);
    insert_item(&conn, "b", None, r#"["rust"]"#);
    insert_item(&conn, "c", None, r#"["rust", "rust", ""]"#);
    insert_item(&conn, "d", None, "[]");

    let facets = discover_facets(&conn, "tags", &FacetQueryOptions::for_column("tags")).unwrap();
    let listed: Vec<(&str, u64)> = facets
        .iter()
        .map(|facet| (facet.value.as_str(), facet.count))
        .collect();
    assert_eq!(listed, vec![("rust", 3), ("sqlite", 1)]);
}

#[test]
fn json_list_column_is_exploded_without_multi_select_flag() {
    let conn = open_db_in_memory().unwrap();
    insert_item(&conn, "a", None, "[]");
    insert_item(&conn, "b", None, r#"["x"]"#);

    let facets = discover_facets(&conn, "tags", &FacetQueryOptions::default()).unwrap();
    let listed: Vec<(&str, u64)> = facets
        .iter()
        .map(|facet| (facet.value.as_str(), facet.count))
        .collect();
    assert_eq!(listed, vec![("x", 1)]);
}

#[test]
fn numeric_columns_are_listed_as_text() {
    let conn = open_db_in_memory().unwrap();
    insert_item(&conn, "a", None, "[]");
    insert_item(&conn, "b", None, "[]");
    conn.execute("UPDATE items SET priority = 3 WHERE id = 'a';", [])
        .unwrap();

    let facets = discover_facets(&conn, "priority", &FacetQueryOptions::default()).unwrap();
    let values: Vec<&str> = facets.iter().map(|facet| facet.value.as_str()).collect();
    assert_eq!(values, vec!["0", "3"]);
}

#[test]
fn colors_come_from_the_color_table() {
    let conn = open_db_in_memory().unwrap();
    insert_item(&conn, "a", Some("work"), "[]");
    insert_item(&conn, "b", Some("home"), "[]");
    conn.execute(
        "INSERT INTO facet_colors (column_name, value, color) VALUES ('folder', 'work', '#3366ff');",
        [],
    )
    .unwrap();

    let facets = discover_facets(&conn, "folder", &FacetQueryOptions::default()).unwrap();
    let work = facets.iter().find(|facet| facet.value == "work").unwrap();
    let home = facets.iter().find(|facet| facet.value == "home").unwrap();
    assert_eq!(work.color.as_deref(), Some("#3366ff"));
    assert_eq!(home.color, None);
}

#[test]
fn empty_and_uninitialized_stores_yield_no_facets() {
    let conn = open_db_in_memory().unwrap();
    assert!(discover_facets(&conn, "status", &FacetQueryOptions::default())
        .unwrap()
        .is_empty());

    let raw = Connection::open_in_memory().unwrap();
    assert!(discover_facets(&raw, "status", &FacetQueryOptions::default())
        .unwrap()
        .is_empty());
}

#[test]
fn unknown_column_is_a_validation_error() {
    let conn = open_db_in_memory().unwrap();
    let err = discover_facets(&conn, "password", &FacetQueryOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        CoreError::Validation(ValidationError::UnknownFacet(column)) if column == "password"
    ));
}

#[test]
fn cache_invalidation_forces_rediscovery() {
    let conn = open_db_in_memory().unwrap();
    insert_item(&conn, "a", Some("work"), "[]");
    let cache = FacetCache::new(Duration::from_secs(300));
    let options = FacetQueryOptions::default();

    assert_eq!(cache.get_or_discover(&conn, "folder", &options).unwrap()[0].count, 1);
    insert_item(&conn, "b", Some("work"), "[]");
    assert_eq!(cache.get_or_discover(&conn, "folder", &options).unwrap()[0].count, 1);

    cache.invalidate("folder");
    assert_eq!(cache.get_or_discover(&conn, "folder", &options).unwrap()[0].count, 2);

    cache.get_or_discover(&conn, "tags", &FacetQueryOptions::for_column("tags")).unwrap();
    cache.get_or_discover(&conn, "tags", &FacetQueryOptions::default()).unwrap();
    assert_eq!(cache.len(), 2);
    cache.invalidate_all();
    assert!(cache.is_empty());
}

#[test]
fn cached_facets_expire_after_ttl() {
    let conn = open_db_in_memory().unwrap();
    insert_item(&conn, "a", Some("work"), "[]");
    let cache = FacetCache::new(Duration::from_millis(50));
    let options = FacetQueryOptions::default();

    assert_eq!(cache.get_or_discover(&conn, "folder", &options).unwrap()[0].count, 1);
    insert_item(&conn, "b", Some("work"), "[]");
    assert_eq!(cache.get_or_discover(&conn, "folder", &options).unwrap()[0].count, 1);

    std::thread::sleep(Duration::from_millis(120));
    assert_eq!(cache.get_or_discover(&conn, "folder", &options).unwrap()[0].count, 2);
}

fn insert_item(conn: &Connection, id: &str, folder: Option<&str>, tags: &str) {
    conn.execute(
        "INSERT INTO items (id, item_type, name, folder, tags) VALUES (?1, 'note', ?1, ?2, ?3);",
        params![id, folder, tags],
    )
    .unwrap();
}
