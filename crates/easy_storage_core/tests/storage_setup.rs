use easy_storage_core::{
    open_db_in_memory, table_columns, table_exists, table_info, DbError, Dialect, FieldInfo, MappingError, Model, ModelInfo,
    Params, RepoError, Row, RowResult, SqliteType, Storage, StorageConfig,
};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
struct Sample {
    guid: Uuid,
    label: String,
    scratch: String,
}

impl Model for Sample {
    fn describe() -> ModelInfo {
        ModelInfo::new("SampleModel")
            .table("Samples")
            .field(FieldInfo::new("Guid").column("Key").primary_key())
            .property("Label")
            .field(FieldInfo::new("Scratch").ignored())
    }

    fn to_params(&self) -> Params {
        Params::new()
            .with_value("Guid", self.guid)
            .with_value("Label", self.label.as_str())
    }

    fn from_row(row: &Row) -> RowResult<Self> {
        Ok(Self {
            guid: row.get("Guid")?,
            label: row.get("Label")?,
            scratch: String::new(),
        })
    }
}

struct Keyless;

impl Model for Keyless {
    fn describe() -> ModelInfo {
        ModelInfo::new("Keyless").property("Name")
    }

    fn to_params(&self) -> Params {
        Params::new()
    }

    fn from_row(_row: &Row) -> RowResult<Self> {
        Ok(Self)
    }
}

const SAMPLES: &str = "CREATE TABLE Samples (Key TEXT PRIMARY KEY NOT NULL, Label TEXT NOT NULL);";

#[tokio::test]
async fn custom_key_column_round_trips() {
    let storage = Storage::open_in_memory().unwrap();
    storage.connection().execute_batch(SAMPLES).await.unwrap();
    let repo = storage.repository::<Sample>().unwrap();

    assert_eq!(repo.table().key_property(), "Guid");
    assert_eq!(repo.table().ignored_properties().to_vec(), vec!["Scratch".to_string()]);

    let sample = Sample {
        guid: Uuid::new_v4(),
        label: "first".to_string(),
        scratch: "not persisted".to_string(),
    };
    repo.insert(&sample, false, None).await.unwrap();

    let loaded = repo.get_by("Guid", sample.guid, None).await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].guid, sample.guid);
    assert_eq!(loaded[0].label, "first");
    assert!(loaded[0].scratch.is_empty());

    let renamed = Sample {
        label: "renamed".to_string(),
        ..sample.clone()
    };
    assert_eq!(repo.update(&renamed, None).await.unwrap(), 1);
    assert_eq!(repo.get(None).await.unwrap()[0].label, "renamed");

    assert_eq!(repo.delete_by("Guid", sample.guid, None).await.unwrap(), 1);
}

#[tokio::test]
async fn unmappable_model_fails_when_requested() {
    let storage = Storage::open_in_memory().unwrap();

    let error = storage.repository::<Keyless>().err().unwrap();
    assert!(matches!(error, RepoError::Mapping(MappingError::MissingKey)));
    assert_eq!(
        error.to_string(),
        "The model does not have a default 'Id' property specified or any of its members marked as Identity."
    );
}

#[tokio::test]
async fn table_columns_reports_declared_types() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE Person (Id INTEGER PRIMARY KEY, Name text NOT NULL, Score REAL DEFAULT 0, Photo BLOB);",
    )
    .await
    .unwrap();

    let columns = table_columns(&conn, "Person").await.unwrap();
    let summary: Vec<(&str, SqliteType, bool, Option<&str>, u32)> = columns
        .iter()
        .map(|column| {
            (
                column.name.as_str(),
                column.kind,
                column.not_null,
                column.default_value.as_deref(),
                column.primary_key_position,
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            ("Id", SqliteType::Integer, false, None, 1),
            ("Name", SqliteType::Text, true, None, 0),
            ("Score", SqliteType::Real, false, Some("0"), 0),
            ("Photo", SqliteType::Blob, false, None, 0),
        ]
    );
    assert_eq!(columns[1].declared_type, "text");
}

#[tokio::test]
async fn table_columns_rejects_other_declared_types() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch("CREATE TABLE Events (Id INTEGER PRIMARY KEY, Happened DATETIME);")
        .await
        .unwrap();

    let error = table_columns(&conn, "Events").await.unwrap_err();
    assert!(matches!(
        error,
        DbError::UnsupportedColumnType { ref column, ref declared }
            if column == "Happened" && declared == "DATETIME"
    ));
}

#[tokio::test]
async fn table_info_reports_existence_and_schema() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch("CREATE TABLE Notes (Id INTEGER PRIMARY KEY, Body TEXT);")
        .await
        .unwrap();

    assert!(table_exists(&conn, "Notes").await.unwrap());
    assert!(!table_exists(&conn, "Missing").await.unwrap());

    let info = table_info(&conn, "Notes").await.unwrap();
    assert_eq!(info.name, "Notes");
    assert!(info.sql.starts_with("CREATE TABLE Notes"));
    assert_eq!(info.columns.len(), 2);
    assert!(matches!(
        table_info(&conn, "Missing").await.unwrap_err(),
        DbError::TableNotFound(_)
    ));
}

#[tokio::test]
async fn table_columns_reports_missing_tables() {
    let conn = open_db_in_memory().unwrap();

    let error = table_columns(&conn, "Missing").await.unwrap_err();
    assert!(matches!(error, DbError::TableNotFound(ref table) if table == "Missing"));
    assert_eq!(error.to_string(), "Table: Missing does not exist.");
}

#[tokio::test]
async fn file_backed_storage_persists_between_opens() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("samples.db");
    let config = StorageConfig::from_json_str(r#"{"busy_timeout_ms": 1000}"#).unwrap();
    let sample = Sample {
        guid: Uuid::new_v4(),
        label: "kept".to_string(),
        scratch: String::new(),
    };

    {
        let storage = Storage::open(&path, &config).unwrap();
        assert_eq!(storage.dialect(), Dialect::Sqlite);
        storage.connection().execute_batch(SAMPLES).await.unwrap();
        let repo = storage.repository::<Sample>().unwrap();
        repo.insert(&sample, false, None).await.unwrap();
    }

    let storage = Storage::open(&path, &config).unwrap();
    let repo = storage.repository::<Sample>().unwrap();
    let loaded = repo.get(None).await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].guid, sample.guid);
}

#[test]
fn invalid_config_is_rejected_by_storage() {
    let dir = tempfile::tempdir().unwrap();
    let config = StorageConfig {
        log_level: Some("info".to_string()),
        ..StorageConfig::default()
    };

    let error = Storage::open(dir.path().join("never.db"), &config).err().unwrap();
    assert!(matches!(error, RepoError::Db(DbError::Config(_))));
}
