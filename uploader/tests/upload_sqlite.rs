//! End-to-end uploads against SQLite database files.

use csvload::{
    ColumnMapping, ColumnSpec, Config, ConnectOptions, Database, SchemaError, TableStore,
    Transformer, UploadError, Uploader, Validator,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const CONFIG: &str = r#"{
    "table": "users",
    "csv_separator": ",",
    "columns": {
        "name": {
            "type": "string",
            "nullable": false,
            "validator": [{"type": "string", "min_length": 1, "max_length": 255}],
            "transformer": ["lower", "ucfirst"]
        },
        "email": {
            "type": "string",
            "nullable": false,
            "unique": true,
            "validator": ["email"],
            "transformer": ["lower"]
        }
    }
}"#;

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

fn sqlite(dir: &TempDir) -> ConnectOptions {
    ConnectOptions::sqlite(dir.path().join("users.db").to_string_lossy())
}

async fn prepared(dir: &TempDir) -> Uploader {
    let config = Config::from_json(CONFIG).unwrap();
    let mut uploader = Uploader::with_database(config);
    uploader.create_table(&sqlite(dir)).await.unwrap();
    uploader
}

async fn upload(dir: &TempDir, csv: &Path) -> csvload::UploadResult {
    let mut uploader = prepared_or_open(dir).await;
    let result = uploader.upload(csv, &sqlite(dir), false).await.unwrap();
    uploader.close().await.unwrap();
    result
}

async fn prepared_or_open(dir: &TempDir) -> Uploader {
    let config = Config::from_json(CONFIG).unwrap();
    let mut db = Database::new();
    db.open(&sqlite(dir)).await.unwrap();
    if !db.table_exists("users").await {
        db.create_table("users", &config.columns).await.unwrap();
    }
    Uploader::new(config, db)
}

#[tokio::test]
async fn invalid_email_is_reported_with_its_line() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write(&dir, "users.csv", "name,email\nJohn,john@x.com\nJane,not-an-email");

    let result = upload(&dir, &csv).await;

    assert_eq!(result.inserted(), 1);
    assert_eq!(result.processed(), 2);
    assert_eq!(result.skipped(), 1);
    assert_eq!(
        result.errors(),
        &["invalid email email='not-an-email' at line 3".to_string()]
    );
}

#[tokio::test]
async fn second_upload_of_same_email_is_a_duplicate() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write(&dir, "users.csv", "name,email\nJohn,john@x.com\n");

    let first = upload(&dir, &csv).await;
    assert_eq!(first.inserted(), 1);
    assert!(first.errors().is_empty());

    let second = upload(&dir, &csv).await;
    assert_eq!(second.inserted(), 0);
    assert_eq!(second.processed(), 1);
    assert_eq!(second.skipped(), 1);
    assert_eq!(second.errors().len(), 1);
    assert!(second.errors()[0].ends_with(" at line 2"), "{}", second.errors()[0]);
    assert!(second.errors()[0].contains("UNIQUE"));
}

#[tokio::test]
async fn create_table_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut uploader = prepared(&dir).await;

    let err = uploader.create_table(&sqlite(&dir)).await.unwrap_err();
    assert!(matches!(err, UploadError::Schema(SchemaError::TableExists(ref t)) if t == "users"));
    uploader.close().await.unwrap();

    let mut db = Database::new();
    db.open(&sqlite(&dir)).await.unwrap();
    assert!(db.table_exists("users").await);
    db.close().await.unwrap();
}

#[tokio::test]
async fn missing_table_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write(&dir, "users.csv", "name,email\nJohn,john@x.com\n");

    let mut uploader = Uploader::with_database(Config::from_json(CONFIG).unwrap());
    let err = uploader.upload(&csv, &sqlite(&dir), false).await.unwrap_err();
    assert_eq!(err.to_string(), "Table \"users\" not exists");
}

#[tokio::test]
async fn unknown_driver_never_connects() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write(&dir, "users.csv", "name,email\nJohn,john@x.com\n");

    let mut uploader = Uploader::with_database(Config::from_json(CONFIG).unwrap());
    let err = uploader
        .upload(&csv, &ConnectOptions::new("oracle"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Config(csvload::ConfigError::UnknownDriver(_))));
    assert!(!uploader.store().is_open());
    assert_eq!(uploader.store().last_error(), Some("Unknown database driver [oracle]"));
}

#[tokio::test]
async fn batched_duplicate_rolls_back_the_whole_batch() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write(
        &dir,
        "users.csv",
        "name,email\na,a@x.com\nb,b@x.com\nc,A@X.com\nd,d@x.com\ne,e@x.com\n",
    );

    let config = Config::from_json(CONFIG).unwrap().with_batch_size(2);
    let mut db = Database::new();
    db.open(&sqlite(&dir)).await.unwrap();
    db.create_table("users", &config.columns).await.unwrap();
    let mut uploader = Uploader::new(config, db);

    let result = uploader.upload(&csv, &sqlite(&dir), false).await.unwrap();

    // [a, b] ok, [c(dup of a), d] rejected as a whole, [e] ok
    assert_eq!(result.inserted(), 3);
    assert_eq!(result.skipped(), 1);
    assert_eq!(result.processed(), 5);
    assert!(result.errors()[0].ends_with(" at line 5"));
}

#[tokio::test]
async fn dry_run_leaves_table_empty() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write(&dir, "users.csv", "name,email\nJohn,john@x.com\nJane,jane@x.com\n");

    let mut uploader = prepared_or_open(&dir).await;
    let dry = uploader.upload(&csv, &sqlite(&dir), true).await.unwrap();
    assert_eq!(dry.inserted(), 0);
    assert_eq!(dry.processed(), 2);

    // a real run afterwards inserts everything: nothing was written before
    let real = uploader.upload(&csv, &sqlite(&dir), false).await.unwrap();
    assert_eq!(real.inserted(), 2);
    assert!(real.errors().is_empty());
}

#[tokio::test]
async fn semicolon_file_with_integer_column() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write(&dir, "people.csv", "name;age\n  alice ;30\nbob;\ncarol;abc\n");

    let columns = ColumnMapping::new()
        .with(
            "name",
            ColumnSpec::string()
                .required()
                .with_transformer(Transformer::Ucfirst),
        )
        .with(
            "age",
            ColumnSpec::integer().with_validator(Validator::Integer { min: Some(0), max: None }),
        );
    let config = Config::new("people", columns).with_separator("auto").with_batch_size(10);

    let mut uploader = Uploader::with_database(config);
    uploader.create_table(&sqlite(&dir)).await.unwrap();
    let result = uploader.upload(&csv, &sqlite(&dir), false).await.unwrap();

    // empty age fails the integer validator, like "abc"
    assert_eq!(result.inserted(), 1);
    assert_eq!(result.skipped(), 2);
    assert_eq!(
        result.errors(),
        &[
            "invalid integer age='' at line 3".to_string(),
            "invalid integer age='abc' at line 4".to_string(),
        ]
    );
}

#[tokio::test]
async fn error_lines_count_blank_lines_and_quoted_newlines() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write(
        &dir,
        "users.csv",
        "name,email\r\n\"Ann\r\nMarie\",ann@x.com\r\n\r\nJane,not-an-email\r\nbob,bob@x.com\r\n",
    );

    let result = upload(&dir, &csv).await;

    assert_eq!(result.inserted(), 2);
    assert_eq!(result.processed(), 3);
    assert_eq!(
        result.errors(),
        &["invalid email email='not-an-email' at line 5".to_string()]
    );
}

#[tokio::test]
async fn latin1_bytes_after_the_detection_sample_are_decoded() {
    let dir = tempfile::tempdir().unwrap();
    let mut content = b"name,email\n".to_vec();
    for i in 0..8000 {
        content.extend_from_slice(format!("user{},user{}@x.com\n", i, i).as_bytes());
    }
    content.extend_from_slice(b"Jos\xE9,jose@x.com\n");
    let csv = dir.path().join("users.csv");
    fs::write(&csv, &content).unwrap();

    let mut uploader = prepared_or_open(&dir).await;
    let result = uploader.upload(&csv, &sqlite(&dir), true).await.unwrap();
    uploader.close().await.unwrap();

    assert_eq!(result.processed(), 8001);
    assert_eq!(result.skipped(), 0);
    assert!(result.errors().is_empty());
}
