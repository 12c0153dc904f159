use isometry_core::aggregate::density::{DensityState, ExtentDensity, RegionOverride, ValueDensity};
use isometry_core::aggregate::engine::{AggregationEngine, AggregationRequest};
use isometry_core::aggregate::granularity::{Bucketing, TimeGranularity};
use isometry_core::cancel::CancelToken;
use isometry_core::config::EngineConfig;
use isometry_core::db::{data_version, open_db_in_memory};
use isometry_core::error::{CoreError, ValidationError};
use isometry_core::filter::clause::FilterClause;
use isometry_core::filter::compiler::{compile_clauses, CompiledFilter};
use isometry_core::model::facet::LatchAxis;
use rusqlite::{params, Connection};

const DAY_MS: i64 = 86_400_000;
const JAN_15_2024: i64 = 1_705_276_800_000;
const FEB_10_2024: i64 = 1_707_523_200_000;
const MAR_20_2024: i64 = 1_710_892_800_000;

fn insert(
    conn: &Connection,
    id: &str,
    name: &str,
    folder: Option<&str>,
    created_at: i64,
    priority: i64,
) {
    conn.execute(
        "INSERT INTO items (id, item_type, name, folder, created_at, modified_at, priority)
         VALUES (?1, 'note', ?2, ?3, ?4, ?4, ?5);",
        params![id, name, folder, created_at, priority],
    )
    .unwrap();
}

fn mixed_store() -> Connection {
    let conn = open_db_in_memory().unwrap();
    let folders = [Some("work"), Some("personal"), Some("archive"), None];
    for index in 0..24_i64 {
        insert(
            &conn,
            &format!("item-{index:02}"),
            &format!("Item {index}"),
            folders[(index % 4) as usize],
            JAN_15_2024 + index * 11 * DAY_MS,
            index % 6,
        );
    }
    conn.execute_batch("UPDATE items SET deleted_at = 1 WHERE id IN ('item-03', 'item-10');")
        .unwrap();
    conn
}

fn engine(conn: &Connection) -> AggregationEngine<'_> {
    AggregationEngine::try_new(conn, EngineConfig::default()).unwrap()
}

#[test]
fn quarter_cells_drill_down_to_their_items() {
    let conn = open_db_in_memory().unwrap();
    insert(&conn, "A", "Kickoff", Some("work"), JAN_15_2024, 0);
    insert(&conn, "B", "Review", Some("work"), FEB_10_2024, 0);
    insert(&conn, "C", "Dentist", Some("personal"), MAR_20_2024, 0);

    let engine = engine(&conn);
    let request = AggregationRequest::new(
        DensityState::collapsed().with_granularity(LatchAxis::Time, 4),
    )
    .axis(LatchAxis::Time, "created_at")
    .axis(LatchAxis::Category, "folder");
    let result = engine
        .aggregate(&CompiledFilter::empty(), &request, None)
        .unwrap();

    assert!(result.is_lossless());
    assert_eq!(result.rows.len(), 2);
    let work = result
        .rows
        .iter()
        .find(|row| row.y.as_deref() == Some("work"))
        .unwrap();
    let personal = result
        .rows
        .iter()
        .find(|row| row.y.as_deref() == Some("personal"))
        .unwrap();
    assert_eq!(work.x, "2024-Q1");
    assert_eq!(work.source_count, 2);
    assert_eq!(work.source_ids, vec!["A".to_string(), "B".to_string()]);
    assert_eq!(personal.source_count, 1);
    assert!(!work.is_leaf);

    for cell in [work, personal] {
        let items = engine.drill_down(&result.plan, &cell.keys, None).unwrap();
        let ids: Vec<String> = items.into_iter().map(|item| item.id).collect();
        assert_eq!(ids, cell.source_ids);
    }
}

#[test]
fn collapsed_counts_match_leaf_counts_for_every_level() {
    let conn = mixed_store();
    let engine = engine(&conn);
    let filters = vec![
        CompiledFilter::empty(),
        compile_clauses(&[FilterClause::in_list(LatchAxis::Category, "folder", ["work", "archive"])])
            .unwrap(),
        compile_clauses(&[FilterClause::range(LatchAxis::Hierarchy, "priority", 1, 3)]).unwrap(),
    ];

    for filter in &filters {
        let leaf = engine
            .aggregate(
                filter,
                &AggregationRequest::new(DensityState::leaf()).axis(LatchAxis::Alphabet, "name"),
                None,
            )
            .unwrap();
        assert!(leaf.rows.iter().all(|row| row.is_leaf && row.source_count == 1));
        let leaf_count = leaf.rows.len() as u64;

        for level in 0..=5 {
            let density = DensityState::collapsed()
                .with_granularity(LatchAxis::Time, level)
                .with_granularity(LatchAxis::Hierarchy, level);
            let request = AggregationRequest::new(density)
                .axis(LatchAxis::Time, "created_at")
                .axis(LatchAxis::Hierarchy, "priority");
            let collapsed = engine.aggregate(filter, &request, None).unwrap();
            let total: u64 = collapsed.rows.iter().map(|row| row.source_count).sum();
            assert_eq!(total, leaf_count, "level {level}");
            assert!(collapsed.is_lossless());
        }
    }
}

#[test]
fn auto_time_granularity_follows_filtered_span() {
    let conn = open_db_in_memory().unwrap();
    insert(&conn, "a", "a", None, JAN_15_2024, 0);
    insert(&conn, "b", "b", None, JAN_15_2024 + 90 * DAY_MS, 0);
    insert(&conn, "c", "c", None, JAN_15_2024 + 800 * DAY_MS, 1);

    let engine = engine(&conn);
    let request = AggregationRequest::new(DensityState::collapsed()).axis(LatchAxis::Time, "created_at");

    let narrow = compile_clauses(&[FilterClause::in_list(LatchAxis::Hierarchy, "priority", [0])])
        .unwrap();
    let plan = engine.plan(&narrow, &request, None).unwrap();
    assert_eq!(plan.axes[0].bucketing, Bucketing::Time(TimeGranularity::Month));

    let wide = engine.plan(&CompiledFilter::empty(), &request, None).unwrap();
    assert_eq!(wide.axes[0].bucketing, Bucketing::Time(TimeGranularity::Year));

    let result = engine.execute(&wide, None).unwrap();
    let years: Vec<&str> = result.rows.iter().map(|row| row.x.as_str()).collect();
    assert_eq!(years, vec!["2024", "2026"]);
}

#[test]
fn sparse_extent_keeps_unfiltered_domain() {
    let conn = mixed_store();
    let engine = engine(&conn);
    let filter = compile_clauses(&[FilterClause::in_list(LatchAxis::Category, "folder", ["work"])])
        .unwrap();
    let request = AggregationRequest::new(DensityState::collapsed().with_extent(ExtentDensity::Sparse))
        .axis(LatchAxis::Category, "folder");

    let result = engine.aggregate(&filter, &request, None).unwrap();
    let cells: Vec<(&str, u64)> = result
        .rows
        .iter()
        .map(|row| (row.x.as_str(), row.source_count))
        .collect();
    assert_eq!(
        cells,
        vec![("(none)", 0), ("archive", 0), ("personal", 0), ("work", 6)]
    );
    assert!(result.is_lossless());

    let populated = engine
        .aggregate(
            &filter,
            &AggregationRequest::new(DensityState::collapsed()).axis(LatchAxis::Category, "folder"),
            None,
        )
        .unwrap();
    assert_eq!(populated.rows.len(), 1);
}

#[test]
fn region_override_mixes_levers_per_axis() {
    let conn = mixed_store();
    let engine = engine(&conn);
    let filter = compile_clauses(&[FilterClause::range(LatchAxis::Hierarchy, "priority", 0, 0)])
        .unwrap();
    let density = DensityState::collapsed()
        .with_granularity(LatchAxis::Hierarchy, 1)
        .with_override(
            RegionOverride::new(LatchAxis::Category)
                .for_facet("folder")
                .value_mode(ValueDensity::Leaf)
                .extent_mode(ExtentDensity::Sparse),
        );
    let request = AggregationRequest::new(density)
        .axis(LatchAxis::Category, "folder")
        .axis(LatchAxis::Hierarchy, "priority");

    let result = engine.aggregate(&filter, &request, None).unwrap();
    assert!(result.plan.grouped);
    assert!(result.plan.sparse);
    assert_eq!(result.plan.axes[1].bucketing, Bucketing::Band { width: 2 });
    assert!(result.rows.iter().all(|row| row.y.as_deref() == Some("0..1")));
    let cells: Vec<(&str, u64)> = result
        .rows
        .iter()
        .map(|row| (row.x.as_str(), row.source_count))
        .collect();
    assert_eq!(
        cells,
        vec![("(none)", 0), ("archive", 2), ("personal", 0), ("work", 2)]
    );
    assert!(result.is_lossless());
}

#[test]
fn null_values_fall_into_none_bucket() {
    let conn = mixed_store();
    let result = engine(&conn)
        .aggregate(
            &CompiledFilter::empty(),
            &AggregationRequest::new(DensityState::collapsed()).axis(LatchAxis::Category, "folder"),
            None,
        )
        .unwrap();
    let none = result.rows.iter().find(|row| row.x == "(none)").unwrap();
    assert_eq!(none.source_count, 5);
    assert_eq!(result.metrics.source_row_count, 22);
}

#[test]
fn alphabet_and_hierarchy_levels_coarsen_buckets() {
    let conn = open_db_in_memory().unwrap();
    for (id, name, priority) in [
        ("1", "apple", 0),
        ("2", "Avocado", 1),
        ("3", "banana", 2),
        ("4", "cherry", 3),
        ("5", "Blueberry", 5),
    ] {
        insert(&conn, id, name, None, JAN_15_2024, priority);
    }
    let engine = engine(&conn);

    let letters = engine
        .aggregate(
            &CompiledFilter::empty(),
            &AggregationRequest::new(DensityState::collapsed().with_granularity(LatchAxis::Alphabet, 1))
                .axis(LatchAxis::Alphabet, "name"),
            None,
        )
        .unwrap();
    let cells: Vec<(&str, u64)> = letters
        .rows
        .iter()
        .map(|row| (row.x.as_str(), row.source_count))
        .collect();
    assert_eq!(cells, vec![("A", 2), ("B", 2), ("C", 1)]);

    let bands = engine
        .aggregate(
            &CompiledFilter::empty(),
            &AggregationRequest::new(DensityState::collapsed().with_granularity(LatchAxis::Hierarchy, 1))
                .axis(LatchAxis::Hierarchy, "priority"),
            None,
        )
        .unwrap();
    let cells: Vec<(&str, u64)> = bands
        .rows
        .iter()
        .map(|row| (row.x.as_str(), row.source_count))
        .collect();
    assert_eq!(cells, vec![("0..1", 2), ("2..3", 2), ("4..5", 1)]);
}

#[test]
fn coordinates_group_into_cells() {
    let conn = open_db_in_memory().unwrap();
    for (id, latitude) in [("a", 38.721), ("b", 38.729), ("c", 38.735)] {
        conn.execute(
            "INSERT INTO items (id, item_type, name, latitude, longitude) VALUES (?1, 'event', ?1, ?2, 10.5);",
            params![id, latitude],
        )
        .unwrap();
    }
    let result = engine(&conn)
        .aggregate(
            &CompiledFilter::empty(),
            &AggregationRequest::new(DensityState::collapsed()).axis(LatchAxis::Location, "latitude"),
            None,
        )
        .unwrap();
    let cells: Vec<(&str, u64)> = result
        .rows
        .iter()
        .map(|row| (row.x.as_str(), row.source_count))
        .collect();
    assert_eq!(cells, vec![("38.72", 2), ("38.73", 1)]);
}

#[test]
fn coordinates_on_cell_edges_stay_in_their_cell() {
    let conn = open_db_in_memory().unwrap();
    for (id, latitude) in [("a", 0.29), ("b", 0.57), ("c", 1.13), ("d", 38.72), ("e", -0.29)] {
        conn.execute(
            "INSERT INTO items (id, item_type, name, latitude) VALUES (?1, 'event', ?1, ?2);",
            params![id, latitude],
        )
        .unwrap();
    }
    let result = engine(&conn)
        .aggregate(
            &CompiledFilter::empty(),
            &AggregationRequest::new(DensityState::collapsed()).axis(LatchAxis::Location, "latitude"),
            None,
        )
        .unwrap();
    let cells: Vec<(&str, Vec<&str>)> = result
        .rows
        .iter()
        .map(|row| {
            (
                row.x.as_str(),
                row.source_ids.iter().map(String::as_str).collect(),
            )
        })
        .collect();
    assert_eq!(
        cells,
        vec![
            ("-0.29", vec!["e"]),
            ("0.29", vec!["a"]),
            ("0.57", vec!["b"]),
            ("1.13", vec!["c"]),
            ("38.72", vec!["d"]),
        ]
    );

    let range = compile_clauses(&[FilterClause::range(LatchAxis::Location, "latitude", 0.29, 0.299)])
        .unwrap();
    let ranged = engine(&conn)
        .aggregate(
            &range,
            &AggregationRequest::new(DensityState::collapsed()).axis(LatchAxis::Location, "latitude"),
            None,
        )
        .unwrap();
    assert_eq!(ranged.rows.len(), 1);
    assert_eq!(ranged.rows[0].x, "0.29");
}

#[test]
fn week_spanning_new_year_is_one_bucket() {
    let conn = open_db_in_memory().unwrap();
    // 2024-12-30 (Monday), 2025-01-01 (Wednesday), 2025-01-05 (Sunday), 2025-01-06 (Monday).
    for (id, created_at) in [
        ("a", 1_735_516_800_000_i64),
        ("b", 1_735_689_600_000),
        ("c", 1_736_035_200_000),
        ("d", 1_736_121_600_000),
    ] {
        conn.execute(
            "INSERT INTO items (id, item_type, name, created_at) VALUES (?1, 'note', ?1, ?2);",
            params![id, created_at],
        )
        .unwrap();
    }
    let result = engine(&conn)
        .aggregate(
            &CompiledFilter::empty(),
            &AggregationRequest::new(DensityState::collapsed().with_granularity(LatchAxis::Time, 2))
                .axis(LatchAxis::Time, "created_at"),
            None,
        )
        .unwrap();
    let cells: Vec<(&str, u64)> = result
        .rows
        .iter()
        .map(|row| (row.x.as_str(), row.source_count))
        .collect();
    assert_eq!(cells, vec![("2024-12-30", 3), ("2025-01-06", 1)]);
}

#[test]
fn leaf_mode_is_capped_and_flagged() {
    let conn = mixed_store();
    let config = EngineConfig {
        leaf_row_limit: 5,
        ..EngineConfig::default()
    };
    let engine = AggregationEngine::try_new(&conn, config).unwrap();
    let result = engine
        .aggregate(
            &CompiledFilter::empty(),
            &AggregationRequest::new(DensityState::leaf().with_view_mode("gallery"))
                .axis(LatchAxis::Alphabet, "name"),
            None,
        )
        .unwrap();

    assert_eq!(result.rows.len(), 5);
    assert!(result.truncated);
    assert!(!result.is_lossless());
    assert_eq!(result.metrics.source_row_count, 22);
    assert_eq!(result.view_mode, "gallery");
    assert_eq!(result.rows[0].label, result.rows[0].x);
}

#[test]
fn metrics_and_data_version_are_reported() {
    let conn = mixed_store();
    let config = EngineConfig {
        performance_target_ms: 60_000,
        ..EngineConfig::default()
    };
    let engine = AggregationEngine::try_new(&conn, config).unwrap();
    let result = engine
        .aggregate(
            &CompiledFilter::empty(),
            &AggregationRequest::new(DensityState::collapsed()).axis(LatchAxis::Category, "folder"),
            None,
        )
        .unwrap();

    assert!(result.metrics.within_performance_target);
    assert_eq!(result.metrics.aggregated_row_count, 4);
    assert!((result.metrics.compression_ratio - 4.0 / 22.0).abs() < 1e-9);
    assert_eq!(result.data_version, data_version(&conn).unwrap());
}

#[test]
fn empty_store_aggregates_to_nothing() {
    let conn = open_db_in_memory().unwrap();
    let result = engine(&conn)
        .aggregate(
            &CompiledFilter::empty(),
            &AggregationRequest::new(DensityState::collapsed()).axis(LatchAxis::Time, "created_at"),
            None,
        )
        .unwrap();
    assert!(result.rows.is_empty());
    assert_eq!(result.metrics.compression_ratio, 0.0);
    assert!(result.is_lossless());
}

#[test]
fn overlapping_time_overrides_are_rejected() {
    let conn = mixed_store();
    let density = DensityState::collapsed()
        .with_override(RegionOverride::new(LatchAxis::Time).granularity(1))
        .with_override(RegionOverride::new(LatchAxis::Time).extent_mode(ExtentDensity::Sparse));
    let request = AggregationRequest::new(density).axis(LatchAxis::Time, "created_at");

    let err = engine(&conn)
        .aggregate(&CompiledFilter::empty(), &request, None)
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Validation(ValidationError::OverlappingRegionOverrides {
            axis: LatchAxis::Time
        })
    ));
}

#[test]
fn out_of_range_granularity_is_rejected() {
    let conn = mixed_store();
    let request = AggregationRequest::new(DensityState::collapsed().with_granularity(LatchAxis::Time, 9))
        .axis(LatchAxis::Time, "created_at");
    let err = engine(&conn)
        .aggregate(&CompiledFilter::empty(), &request, None)
        .unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn sparse_product_above_cap_is_rejected() {
    let conn = mixed_store();
    let config = EngineConfig {
        max_sparse_cells: 3,
        ..EngineConfig::default()
    };
    let engine = AggregationEngine::try_new(&conn, config).unwrap();
    let request = AggregationRequest::new(DensityState::collapsed().with_extent(ExtentDensity::Sparse))
        .axis(LatchAxis::Category, "folder");
    assert!(matches!(
        engine.aggregate(&CompiledFilter::empty(), &request, None),
        Err(CoreError::Validation(ValidationError::SparseGridTooLarge { cells: 4, limit: 3 }))
    ));
}

#[test]
fn drill_down_requires_one_key_per_axis() {
    let conn = mixed_store();
    let engine = engine(&conn);
    let plan = engine
        .plan(
            &CompiledFilter::empty(),
            &AggregationRequest::new(DensityState::collapsed()).axis(LatchAxis::Category, "folder"),
            None,
        )
        .unwrap();
    let err = engine
        .drill_down(&plan, &["work".to_string(), "extra".to_string()], None)
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Validation(ValidationError::CellKeyMismatch {
            expected: 1,
            actual: 2
        })
    ));
}

#[test]
fn cancelled_token_stops_aggregation() {
    let conn = mixed_store();
    let token = CancelToken::new();
    token.cancel();
    let err = engine(&conn)
        .aggregate(
            &CompiledFilter::empty(),
            &AggregationRequest::new(DensityState::collapsed()).axis(LatchAxis::Category, "folder"),
            Some(&token),
        )
        .unwrap_err();
    assert!(matches!(err, CoreError::Cancelled));
}

#[test]
fn uninitialized_store_fails_engine_construction() {
    let conn = Connection::open_in_memory().unwrap();
    assert!(matches!(
        AggregationEngine::try_new(&conn, EngineConfig::default()),
        Err(CoreError::Initialization(_))
    ));
}
