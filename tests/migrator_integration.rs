//! Migrator behavior against an in-memory SQLite database.

use pretty_assertions::assert_eq;
use schemashift::migrate::templates;
use schemashift::prelude::*;
use schemashift::sqlite::SqliteDatabase;
use std::sync::Arc;

fn widgets_steps() -> Vec<Step> {
    vec![
        Step::new(
            "create widgets",
            [Statement::create_table(
                "widgets",
                [
                    Column::new("id", ColumnType::BigInt),
                    Column::new("name", ColumnType::Text),
                ],
            )],
        ),
        Step::new(
            "unique widget ids",
            [Statement::create_index(true, "id", "widgets", ["id"])],
        ),
    ]
}

fn broken_step() -> Step {
    Step::new(
        "gadgets",
        [
            Statement::create_table("gadgets", [Column::new("id", ColumnType::BigInt)]),
            Statement::create_index(false, "missing", "gadgets", ["missing"]),
        ],
    )
}

async fn open() -> SqliteDatabase {
    SqliteDatabase::open_in_memory().await.expect("open in-memory database")
}

async fn has_table<D: Database>(migrator: &Migrator<D>, table: &str) -> bool {
    let rows = migrator
        .database()
        .query(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            &[SqlValue::from(table)],
        )
        .await
        .unwrap();
    rows == vec![vec![SqlValue::Int(1)]]
}

#[tokio::test]
async fn test_widgets_up_and_down() {
    let migrator = open().await.migrator().steps(widgets_steps()).build().unwrap();
    assert_eq!(migrator.len(), 3);
    assert_eq!(migrator.current().await.unwrap(), (0, false));

    assert_eq!(migrator.up().await.unwrap(), 3);
    assert_eq!(migrator.current().await.unwrap(), (3, false));
    assert!(has_table(&migrator, "widgets").await);

    // A second run has nothing to do.
    assert_eq!(migrator.up().await.unwrap(), 0);
    assert!(migrator.next().await.unwrap_err().is_end_of_sequence());

    let history = migrator.history().await.unwrap();
    let versions: Vec<usize> = history.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![1, 2, 3]);
    assert!(history.iter().all(|e| e.is_up && !e.is_dirty && e.error.is_none()));
    assert!(history[1].statements.starts_with("CREATE TABLE \"widgets\""));
    assert!(history.windows(2).all(|w| w[0].ts < w[1].ts));
    // Whole seconds, never ahead of the client clock.
    let now = schemashift::migrate::log::now_secs();
    assert!(history.iter().all(|e| e.ts <= now && now - e.ts < 60));

    assert_eq!(migrator.down().await.unwrap(), 3);
    assert_eq!(migrator.current().await.unwrap(), (0, false));
    assert!(!has_table(&migrator, "widgets").await);
    assert!(!has_table(&migrator, "migrations_log").await);
    assert!(migrator.history().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_next_and_prev_walk_one_step() {
    let migrator = open().await.migrator().steps(widgets_steps()).build().unwrap();

    migrator.next().await.unwrap();
    migrator.next().await.unwrap();
    assert_eq!(migrator.current().await.unwrap(), (2, false));
    assert!(has_table(&migrator, "widgets").await);

    migrator.prev().await.unwrap();
    assert_eq!(migrator.current().await.unwrap(), (1, false));
    assert!(!has_table(&migrator, "widgets").await);

    let last = migrator.history().await.unwrap().pop().unwrap();
    assert!(!last.is_up);
    assert!(last.statements.starts_with("DROP TABLE \"widgets\""));

    migrator.next().await.unwrap();
    assert_eq!(migrator.current().await.unwrap(), (2, false));
}

#[tokio::test]
async fn test_every_builder_round_trips() {
    let registry = templates::builtin()
        .template(
            "seed_widgets.up.sql",
            "INSERT INTO {{ req.ident(req.payload.table) }} (id, name, weight) VALUES \
             {% for w in req.payload.rows %}({{ req.arg(w.id) }}, {{ req.arg(w.name) }}, {{ req.arg(w.weight) }}){{ \", \" if not loop.last else \"\" }}{% endfor %}",
        )
        .template(
            "seed_widgets.down.sql",
            "DELETE FROM {{ req.ident(req.payload.table) }}",
        )
        .build()
        .unwrap();

    let seed = serde_json::json!({
        "table": "widgets",
        "rows": [
            { "id": 1, "name": "sprocket", "weight": 3 },
            { "id": 2, "name": "gear", "weight": 5 },
        ],
    });

    let migrator = open()
        .await
        .migrator()
        .registry(Arc::new(registry))
        .step(Step::new(
            "widgets",
            [
                Statement::create_table(
                    "widgets",
                    [
                        Column::new("id", ColumnType::BigInt),
                        Column::new("name", ColumnType::VarChar(64)),
                        Column::new("note", ColumnType::Text).nullable(),
                    ],
                ),
                Statement::add_column("widgets", Column::new("weight", ColumnType::Int).default(0)),
                Statement::create_index(true, "id", "widgets", ["id"]),
                Statement::create_index(false, "name", "widgets", ["name"]),
            ],
        ))
        .step(Step::new(
            "seed widgets",
            [Statement::raw("seed_widgets.up.sql", "seed_widgets.down.sql", seed)],
        ))
        .build()
        .unwrap();

    migrator.up().await.unwrap();
    let rows = migrator
        .database()
        .query("SELECT id, name, weight FROM widgets ORDER BY id", &[])
        .await
        .unwrap();
    assert_eq!(
        rows,
        vec![
            vec![SqlValue::Int(1), SqlValue::from("sprocket"), SqlValue::Int(3)],
            vec![SqlValue::Int(2), SqlValue::from("gear"), SqlValue::Int(5)],
        ]
    );

    migrator.down().await.unwrap();
    assert!(!has_table(&migrator, "widgets").await);

    // Down undid everything Up did, so Up applies cleanly again.
    assert_eq!(migrator.up().await.unwrap(), 3);
    assert_eq!(migrator.current().await.unwrap(), (3, false));
}

#[tokio::test]
async fn test_failed_step_rolls_back() {
    let mut steps = widgets_steps();
    steps.push(broken_step());
    let migrator = open().await.migrator().steps(steps).build().unwrap();

    let err = migrator.up().await.unwrap_err();
    let MigrationError::Incomplete { completed, source } = &err else {
        panic!("expected Incomplete, got {err}");
    };
    assert_eq!(*completed, 3);
    assert!(matches!(source.as_ref(), MigrationError::StepFailed { step, .. } if step == "gadgets"));
    assert!(err.executed_sql().unwrap().starts_with("CREATE TABLE \"gadgets\""));

    // The transaction undid the partial step; the state stays clean.
    assert_eq!(migrator.current().await.unwrap(), (3, false));
    assert!(!has_table(&migrator, "gadgets").await);

    let last = migrator.history().await.unwrap().pop().unwrap();
    assert_eq!(last.version, 3);
    assert!(!last.is_dirty);
    assert!(last.error.as_deref().unwrap().contains("missing"));
    assert!(last.statements.contains("CREATE TABLE \"gadgets\""));
}

#[tokio::test]
async fn test_failed_bookkeeping_step_leaves_no_table() {
    let migrator = open()
        .await
        .migrator()
        .table_name("main.log")
        .step(widgets_steps().remove(0))
        .build()
        .unwrap();

    // Pre-create an index with the name the bookkeeping step wants.
    migrator
        .database()
        .execute_batch("CREATE TABLE decoy (id INTEGER); CREATE INDEX idx_main_log_ts ON decoy (id);")
        .await
        .unwrap();

    let err = migrator.next().await.unwrap_err();
    assert!(matches!(err, MigrationError::StepFailed { .. }), "{err}");
    let message = err.to_string();
    assert!(message.contains("idx_main_log_ts already exists"), "{message}");
    assert!(err.executed_sql().unwrap().contains("\"main\".\"idx_main_log_id\" ON \"log\""));
    assert!(!has_table(&migrator, "log").await);
    assert_eq!(migrator.current().await.unwrap(), (0, false));
}

#[tokio::test]
async fn test_schema_qualified_log_table() {
    let migrator = open()
        .await
        .migrator()
        .table_name("main.log")
        .steps(widgets_steps())
        .build()
        .unwrap();

    assert_eq!(migrator.up().await.unwrap(), 3);
    assert_eq!(migrator.current().await.unwrap(), (3, false));
    assert!(has_table(&migrator, "log").await);

    assert_eq!(migrator.down().await.unwrap(), 3);
    assert_eq!(migrator.current().await.unwrap(), (0, false));
    assert!(!has_table(&migrator, "log").await);
}

#[tokio::test]
async fn test_schema_qualified_index_round_trips() {
    let migrator = open()
        .await
        .migrator()
        .step(Step::new(
            "gadgets",
            [
                Statement::create_table("main.gadgets", [Column::new("id", ColumnType::BigInt)]),
                Statement::create_index(true, "id", "main.gadgets", ["id"]),
            ],
        ))
        .build()
        .unwrap();

    migrator.up().await.unwrap();
    let indexes = migrator
        .database()
        .query(
            "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = 'gadgets'",
            &[],
        )
        .await
        .unwrap();
    assert_eq!(indexes, vec![vec![SqlValue::from("idx_main_gadgets_id")]]);

    migrator.down().await.unwrap();
    assert!(!has_table(&migrator, "gadgets").await);
    assert_eq!(migrator.up().await.unwrap(), 2);
}

#[tokio::test]
async fn test_dirty_state_requires_recovery() {
    let mut steps = widgets_steps();
    steps.push(broken_step());
    let migrator = open()
        .await
        .migrator()
        .use_transaction(false)
        .steps(steps)
        .build()
        .unwrap();

    migrator.up().await.unwrap_err();
    assert_eq!(migrator.current().await.unwrap(), (4, true));
    assert!(has_table(&migrator, "gadgets").await);

    assert!(matches!(migrator.next().await, Err(MigrationError::Dirty { version: 4 })));
    assert!(matches!(migrator.prev().await, Err(MigrationError::Dirty { version: 4 })));
    assert!(matches!(migrator.up().await, Err(MigrationError::Incomplete { completed: 0, .. })));

    // The operator cleans up by hand and records the outcome.
    migrator
        .database()
        .execute("DROP TABLE gadgets", &[])
        .await
        .unwrap();
    assert_eq!(migrator.set_recovered_to_prev().await.unwrap(), 3);
    assert_eq!(migrator.current().await.unwrap(), (3, false));

    assert!(matches!(
        migrator.set_recovered_to_next().await,
        Err(MigrationError::NotDirty)
    ));

    // From a clean state the migrator moves again.
    migrator.prev().await.unwrap();
    assert_eq!(migrator.current().await.unwrap(), (2, false));
}

#[tokio::test]
async fn test_recover_to_next_after_manual_fix() {
    let mut steps = widgets_steps();
    steps.push(broken_step());
    let migrator = open()
        .await
        .migrator()
        .use_transaction(false)
        .steps(steps)
        .build()
        .unwrap();

    migrator.up().await.unwrap_err();
    assert_eq!(migrator.current().await.unwrap(), (4, true));

    assert_eq!(migrator.set_recovered_to_next().await.unwrap(), 4);
    assert_eq!(migrator.current().await.unwrap(), (4, false));

    let history = migrator.history().await.unwrap();
    let dirty = &history[history.len() - 2];
    assert!(dirty.is_dirty);
    assert!(dirty.error.is_some());
    assert!(!history[history.len() - 1].is_dirty);
}

#[tokio::test]
async fn test_set_overrides_state() {
    let migrator = open().await.migrator().steps(widgets_steps()).build().unwrap();

    assert!(migrator.set(1, false).await.is_err(), "log table does not exist yet");
    migrator.up().await.unwrap();

    migrator.set(2, true).await.unwrap();
    assert_eq!(migrator.current().await.unwrap(), (2, true));

    migrator.set(3, false).await.unwrap();
    assert_eq!(migrator.current().await.unwrap(), (3, false));

    assert!(matches!(
        migrator.set(4, false).await,
        Err(MigrationError::InvalidVersion { version: 4, max: 3 })
    ));
    assert_eq!(migrator.history().await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_future_timestamp_poisons_migrator() {
    let migrator = open().await.migrator().steps(widgets_steps()).build().unwrap();
    migrator.next().await.unwrap();

    let future = schemashift::migrate::log::now_secs() + 3_600;
    migrator
        .database()
        .execute(
            "INSERT INTO migrations_log (id, ts, version, is_up, is_dirty, statements) VALUES (?, ?, ?, ?, ?, ?)",
            &[
                SqlValue::from("00000000-0000-0000-0000-000000000000"),
                SqlValue::Int(future),
                SqlValue::Int(1),
                SqlValue::Bool(true),
                SqlValue::Bool(false),
                SqlValue::from(""),
            ],
        )
        .await
        .unwrap();

    assert!(migrator.current().await.unwrap_err().is_consistency_error());
    assert!(migrator.next().await.unwrap_err().is_consistency_error());
    assert!(migrator.set(1, false).await.unwrap_err().is_consistency_error());
}

#[tokio::test]
async fn test_empty_log_is_corruption_until_set() {
    let migrator = open().await.migrator().steps(widgets_steps()).build().unwrap();
    migrator.next().await.unwrap();
    migrator
        .database()
        .execute("DELETE FROM migrations_log", &[])
        .await
        .unwrap();

    assert!(matches!(migrator.current().await, Err(MigrationError::Corrupted(_))));
    assert!(matches!(migrator.next().await, Err(MigrationError::Corrupted(_))));

    migrator.set(1, false).await.unwrap();
    assert_eq!(migrator.current().await.unwrap(), (1, false));
    migrator.next().await.unwrap();
    assert_eq!(migrator.current().await.unwrap(), (2, false));
}

#[tokio::test]
async fn test_plan_renders_without_executing() {
    let migrator = open().await.migrator().steps(widgets_steps()).build().unwrap();

    let plan = migrator.plan_up().await.unwrap();
    let names: Vec<&str> = plan.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["create migrations log", "create widgets", "unique widget ids"]);
    assert_eq!(plan[0].statements.len(), 4);
    assert_eq!(
        plan[2].statements[0].sql,
        "CREATE UNIQUE INDEX \"idx_widgets_id\" ON \"widgets\" (\"id\")"
    );
    assert!(!has_table(&migrator, "migrations_log").await);
    assert!(migrator.plan_down().await.unwrap().is_empty());

    migrator.up().await.unwrap();
    let plan = migrator.plan_down().await.unwrap();
    assert_eq!((plan[0].from, plan[0].to), (3, 2));
    assert_eq!(plan[0].statements[0].sql, "DROP INDEX \"idx_widgets_id\"");
}

#[tokio::test]
async fn test_custom_table_name() {
    let migrator = open()
        .await
        .migrator()
        .table_name("schema_log")
        .steps(widgets_steps())
        .build()
        .unwrap();

    migrator.up().await.unwrap();
    assert!(has_table(&migrator, "schema_log").await);
    assert!(!has_table(&migrator, "migrations_log").await);
    assert_eq!(migrator.current().await.unwrap(), (3, false));
}

#[tokio::test]
async fn test_clock_skew_is_small() {
    let migrator = open().await.migrator().build().unwrap();
    let skew = migrator.clock_skew().await.unwrap();
    assert!(skew.num_seconds().abs() < 5, "skew {skew}");
}

#[tokio::test]
async fn test_build_rejects_bad_steps() {
    let err = open()
        .await
        .migrator()
        .step(Step::new(
            "weights",
            [Statement::add_column("widgets", Column::new("weight", ColumnType::Int))],
        ))
        .step(Step::new("empty", Vec::new()))
        .build()
        .err()
        .unwrap();

    let MigrationError::Validation(errors) = err else {
        panic!("expected validation errors");
    };
    assert_eq!(errors.len(), 2, "{errors}");
    let text = errors.to_string();
    assert!(text.contains("NOT NULL without a default"));
    assert!(text.contains("'empty' has no statements"));
}

#[tokio::test]
async fn test_unknown_driver_fails_at_build() {
    let err = Migrator::builder(open().await).driver("oracle").build().err().unwrap();
    assert!(matches!(err, MigrationError::UnsupportedDriver(_)));
}
