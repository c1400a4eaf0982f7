use super::{RecordingStore, record};
use crate::error::WarehouseError;
use crate::etl::loader::*;
use crate::etl::model::{CleanedRecord, LabelField};
use crate::etl::schema::WarehouseSchema;
use crate::etl::sql::SqlValue;
use crate::etl::vocabulary::Vocabulary;

fn prepare(records: &[CleanedRecord]) -> anyhow::Result<WarehouseSchema> {
    Ok(WarehouseSchema::from_vocabularies(
        &Vocabulary::build(records, LabelField::Genres),
        &Vocabulary::build(records, LabelField::Categories),
    )?)
}

fn sample() -> Vec<CleanedRecord> {
    vec![
        record("Action, Indie", "Single-player"),
        record("indie , Action", "Multi-player, Single-player"),
        record("RPG", "Co-op"),
        record("Strategy, RPG", "Single-player"),
        record("Action", "Co-op, Multi-player"),
    ]
}

#[test]
fn test_state_machine_moves_one_step_forward() {
    assert!(LoadState::Idle.can_transition_to(LoadState::SchemaReset));
    assert!(LoadState::Populated.can_transition_to(LoadState::Augmented));
    assert!(!LoadState::Idle.can_transition_to(LoadState::Populated));
    assert!(!LoadState::Augmented.can_transition_to(LoadState::SchemaReset));
    assert!(LoadState::SchemaCreated.can_transition_to(LoadState::Failed));
    assert!(!LoadState::Committed.can_transition_to(LoadState::Failed));
    assert!(!LoadState::Failed.can_transition_to(LoadState::Idle));

    let mut state = LoadState::Idle;
    let mut path = vec![state.as_str()];
    while let Some(next) = state.next() {
        state = next;
        path.push(state.as_str());
    }
    assert_eq!(
        path,
        vec!["Idle", "SchemaReset", "SchemaCreated", "Populated", "Augmented", "Committed"]
    );
}

#[tokio::test]
async fn test_run_commits_and_summarizes() -> anyhow::Result<()> {
    let records = sample();
    let schema = prepare(&records)?;
    let mut store = RecordingStore::default();

    let mut loader = Loader::new(&mut store, &schema, 500);
    let summary = loader.run(&records).await?;

    assert_eq!(loader.state(), LoadState::Committed);
    assert_eq!(summary.rows_loaded, 5);
    assert_eq!(summary.genre_columns, 4);
    assert_eq!(summary.category_columns, 3);
    assert_eq!(summary.indexes_created, 2 + 4 + 3);
    assert_eq!(summary.final_state, LoadState::Committed);
    assert_eq!(store.commits, 1);
    assert_eq!(store.rollbacks, 0);
    assert_eq!(summary.statements_executed, store.executed.len());
    Ok(())
}

#[tokio::test]
async fn test_statement_order() -> anyhow::Result<()> {
    let records = sample();
    let schema = prepare(&records)?;
    let mut store = RecordingStore::default();
    Loader::new(&mut store, &schema, 500).run(&records).await?;

    let sql: Vec<&str> = store.executed.iter().map(|s| s.sql.as_str()).collect();
    assert!(sql[0].starts_with("DROP TABLE IF EXISTS \"fact_games\""));
    assert!(sql[3].starts_with("CREATE TABLE \"dim_genre_set\""));
    assert!(sql[4].starts_with("CREATE TABLE \"dim_category_set\""));
    assert!(sql[5].starts_with("CREATE TABLE \"fact_games\""));
    assert!(sql[6].starts_with("INSERT INTO \"dim_genre_set\""));
    assert!(sql[7].starts_with("INSERT INTO \"dim_category_set\""));
    assert!(sql[8].starts_with("INSERT INTO \"fact_games\""));
    assert!(sql[9].starts_with("ALTER TABLE \"fact_games\""));
    assert!(sql[10].starts_with("UPDATE \"fact_games\""));
    assert!(sql[11..].iter().all(|s| s.starts_with("CREATE INDEX")));
    Ok(())
}

#[tokio::test]
async fn test_ids_are_contiguous_and_synchronized() -> anyhow::Result<()> {
    let records = sample();
    let schema = prepare(&records)?;
    let mut store = RecordingStore::default();
    Loader::new(&mut store, &schema, 2).run(&records).await?;

    let facts = store.table("fact_games");
    assert_eq!(facts.len(), records.len());
    for (position, row) in facts.iter().enumerate() {
        let expected = SqlValue::Int(i64::try_from(position)? + 1);
        assert_eq!(row[0], expected, "id");
        assert_eq!(row[1], expected, "category_id");
        assert_eq!(row[2], expected, "genre_id");
    }

    let genre_ids: Vec<&SqlValue> = store.table("dim_genre_set").iter().map(|r| &r[0]).collect();
    let category_ids: Vec<&SqlValue> = store
        .table("dim_category_set")
        .iter()
        .map(|r| &r[0])
        .collect();
    let fact_ids: Vec<&SqlValue> = facts.iter().map(|r| &r[0]).collect();
    assert_eq!(genre_ids, fact_ids);
    assert_eq!(category_ids, fact_ids);
    Ok(())
}

#[tokio::test]
async fn test_equivalent_spellings_set_the_same_flags() -> anyhow::Result<()> {
    let records = vec![
        record("Action, Indie", "Single-player"),
        record("indie , Action", "Single-player"),
    ];
    let schema = prepare(&records)?;
    assert_eq!(schema.genres.len(), 2);

    let mut store = RecordingStore::default();
    Loader::new(&mut store, &schema, 500).run(&records).await?;

    let both = vec![SqlValue::SmallInt(1), SqlValue::SmallInt(1)];
    for row in store.table("dim_genre_set") {
        assert_eq!(row[1..].to_vec(), both);
    }
    Ok(())
}

#[tokio::test]
async fn test_batching_does_not_change_rows() -> anyhow::Result<()> {
    let records = sample();
    let schema = prepare(&records)?;

    let mut single = RecordingStore::default();
    Loader::new(&mut single, &schema, 1).run(&records).await?;
    let mut batched = RecordingStore::default();
    Loader::new(&mut batched, &schema, 500).run(&records).await?;

    assert_eq!(single.tables, batched.tables);
    let inserts = |store: &RecordingStore| {
        store
            .executed
            .iter()
            .filter(|s| s.sql.starts_with("INSERT INTO \"fact_games\""))
            .count()
    };
    assert_eq!(inserts(&single), 5);
    assert_eq!(inserts(&batched), 1);
    Ok(())
}

#[tokio::test]
async fn test_empty_input_creates_empty_schema() -> anyhow::Result<()> {
    let schema = prepare(&[])?;
    let mut store = RecordingStore::default();
    let summary = Loader::new(&mut store, &schema, 500).run(&[]).await?;

    assert_eq!(summary.rows_loaded, 0);
    assert_eq!(summary.indexes_created, 2);
    assert!(
        store
            .executed
            .iter()
            .all(|s| !s.sql.starts_with("INSERT"))
    );
    Ok(())
}

#[tokio::test]
async fn test_store_error_fails_and_rolls_back() -> anyhow::Result<()> {
    let records = sample();
    let schema = prepare(&records)?;
    let mut store = RecordingStore::failing_on("CREATE INDEX");

    let mut loader = Loader::new(&mut store, &schema, 500);
    let err = loader.run(&records).await.unwrap_err();

    assert!(matches!(err, WarehouseError::Store(_)));
    assert_eq!(loader.state(), LoadState::Failed);
    assert_eq!(store.commits, 0);
    assert_eq!(store.rollbacks, 1);
    assert!(store.tables.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_unknown_label_is_fatal() -> anyhow::Result<()> {
    let schema = prepare(&[record("Action", "Co-op")])?;
    let mut store = RecordingStore::default();

    let mut loader = Loader::new(&mut store, &schema, 500);
    let err = loader
        .run(&[record("Action, Racing", "Co-op")])
        .await
        .unwrap_err();

    assert!(matches!(err, WarehouseError::Consistency(_)));
    assert_eq!(loader.state(), LoadState::Failed);
    assert_eq!(store.rollbacks, 1);
    Ok(())
}

#[tokio::test]
async fn test_loader_runs_once() -> anyhow::Result<()> {
    let records = sample();
    let schema = prepare(&records)?;
    let mut store = RecordingStore::default();

    let mut loader = Loader::new(&mut store, &schema, 500);
    loader.run(&records).await?;
    assert!(matches!(
        loader.run(&records).await,
        Err(WarehouseError::Consistency(_))
    ));
    Ok(())
}

#[test]
fn test_rows_per_batch_respects_widest_table() -> anyhow::Result<()> {
    let tokens: Vec<String> = (0..9_000).map(|i| format!("label {i}")).collect();
    let schema = WarehouseSchema::from_vocabularies(
        &Vocabulary::from_raw_tokens(LabelField::Genres, &tokens),
        &Vocabulary::from_raw_tokens(LabelField::Categories, &["Co-op"]),
    )?;
    let mut store = RecordingStore::default();
    let loader = Loader::new(&mut store, &schema, 500);

    assert_eq!(loader.rows_per_batch(), 65_535 / 9_001);
    Ok(())
}
