use certnum_core::db::migrations::latest_version;
use certnum_core::db::{open_db, open_db_in_memory, DbError};
use certnum_core::{RepoError, SqliteArchiveRepository, SqliteIssueRepository};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "certificate_issues");
    assert_table_exists(&conn, "certificate_number_archive");
}

#[test]
fn number_column_is_backed_by_unique_index() {
    let conn = open_db_in_memory().unwrap();

    let unique: i64 = conn
        .query_row(
            "SELECT \"unique\"
             FROM pragma_index_list('certificate_issues')
             WHERE name = 'idx_certificate_issues_number';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(unique, 1);
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("certnum.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "certificate_issues");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn repositories_reject_unmigrated_connection() {
    let conn = Connection::open_in_memory().unwrap();

    let issue_err = SqliteIssueRepository::try_new(&conn).err().unwrap();
    assert!(matches!(
        issue_err,
        RepoError::UninitializedConnection {
            actual_version: 0,
            ..
        }
    ));

    let archive_err = SqliteArchiveRepository::try_new(&conn).err().unwrap();
    assert!(matches!(archive_err, RepoError::UninitializedConnection { .. }));
}

#[test]
fn repository_rejects_schema_without_number_column() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(&format!(
        "CREATE TABLE certificate_issues (issue_uuid TEXT PRIMARY KEY);
         PRAGMA user_version = {};",
        latest_version()
    ))
    .unwrap();

    let err = SqliteIssueRepository::try_new(&conn).err().unwrap();
    assert!(matches!(
        err,
        RepoError::MissingRequiredColumn {
            table: "certificate_issues",
            column: "template_id",
        }
    ));
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
