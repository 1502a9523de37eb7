use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;

use crate::record::Record;

pub const DB_FILE: &str = "plaafp.sqlite3";
pub const DOCUMENTS_KEY: &str = "plaafp.documents";
pub const CURRENT_DOCUMENT_KEY: &str = "plaafp.currentDocumentId";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;
    // Workspaces created before timestamps were tracked lack updated_at.
    ensure_kv_updated_at(&conn)?;

    Ok(conn)
}

fn ensure_kv_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "kv", "updated_at")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE kv ADD COLUMN updated_at TEXT NOT NULL DEFAULT ''",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

pub fn kv_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let text: Option<String> = conn
        .query_row("SELECT value FROM kv WHERE key = ?", [key], |r| r.get(0))
        .optional()?;
    match text {
        None => Ok(None),
        Some(t) => Ok(Some(
            serde_json::from_str(&t).with_context(|| format!("stored value for {key} is not JSON"))?,
        )),
    }
}

/// Writes `value` under `key` and returns the timestamp recorded with it.
pub fn kv_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<String> {
    let at = now_rfc3339();
    conn.execute(
        "INSERT INTO kv(key, value, updated_at) VALUES(?, ?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        (key, serde_json::to_string(value)?, &at),
    )?;
    Ok(at)
}

/// The stored document map as raw JSON entries.
fn load_document_entries(
    conn: &Connection,
) -> anyhow::Result<serde_json::Map<String, serde_json::Value>> {
    match kv_get_json(conn, DOCUMENTS_KEY)? {
        None => Ok(serde_json::Map::new()),
        Some(serde_json::Value::Object(map)) => Ok(map),
        Some(_) => anyhow::bail!("stored document map is malformed: expected a JSON object"),
    }
}

/// Readable documents by id. An entry that is not a record is skipped and
/// left in storage as it is.
pub fn load_documents(conn: &Connection) -> anyhow::Result<BTreeMap<String, Record>> {
    let mut docs = BTreeMap::new();
    for (id, entry) in load_document_entries(conn)? {
        match serde_json::from_value::<Record>(entry) {
            Ok(record) => {
                docs.insert(id, record);
            }
            Err(e) => tracing::warn!(document = %id, "skipping unreadable document: {e}"),
        }
    }
    Ok(docs)
}

pub fn current_document_id(conn: &Connection) -> anyhow::Result<Option<String>> {
    Ok(kv_get_json(conn, CURRENT_DOCUMENT_KEY)?.and_then(|v| v.as_str().map(str::to_string)))
}

/// Stores `record` under `id` in the document map and marks it current.
pub fn save_document(conn: &Connection, id: &str, record: &Record) -> anyhow::Result<String> {
    let tx = conn.unchecked_transaction()?;
    let mut entries = load_document_entries(&tx)?;
    entries.insert(id.to_string(), serde_json::to_value(record)?);
    let saved_at = kv_set_json(&tx, DOCUMENTS_KEY, &serde_json::Value::Object(entries))?;
    kv_set_json(&tx, CURRENT_DOCUMENT_KEY, &serde_json::Value::from(id))?;
    tx.commit()?;
    Ok(saved_at)
}

pub fn set_current_document(conn: &Connection, id: &str) -> anyhow::Result<()> {
    kv_set_json(conn, CURRENT_DOCUMENT_KEY, &serde_json::Value::from(id))?;
    Ok(())
}

/// The current document, if one was saved and is still in the map.
pub fn load_current(conn: &Connection) -> anyhow::Result<Option<(String, Record)>> {
    let Some(id) = current_document_id(conn)? else {
        return Ok(None);
    };
    let mut docs = load_documents(conn)?;
    Ok(docs.remove(&id).map(|r| (id, r)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CountingIds, RecordField, SectionKind};
    use pretty_assertions::assert_eq;

    #[test]
    fn documents_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let r = Record::default()
            .set_field(RecordField::StudentName, "Jordan")
            .append_section(SectionKind::Academic, &mut CountingIds(0));
        {
            let conn = open_db(dir.path()).expect("open");
            save_document(&conn, "doc-a", &Record::default()).expect("save a");
            save_document(&conn, "doc-b", &r).expect("save b");
        }
        let conn = open_db(dir.path()).expect("reopen");
        let docs = load_documents(&conn).expect("load");
        assert_eq!(docs.len(), 2);
        assert_eq!(docs["doc-a"], Record::default());
        assert_eq!(load_current(&conn).expect("current"), Some(("doc-b".to_string(), r)));
    }

    #[test]
    fn empty_workspace_has_no_current_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = open_db(dir.path()).expect("open");
        assert_eq!(load_current(&conn).expect("current"), None);
        assert!(load_documents(&conn).expect("load").is_empty());
    }

    #[test]
    fn dangling_current_id_is_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = open_db(dir.path()).expect("open");
        set_current_document(&conn, "missing").expect("set current");
        assert_eq!(load_current(&conn).expect("current"), None);
    }

    #[test]
    fn legacy_kv_table_gains_timestamp_column() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let conn = Connection::open(dir.path().join(DB_FILE)).expect("raw open");
            conn.execute("CREATE TABLE kv(key TEXT PRIMARY KEY, value TEXT NOT NULL)", [])
                .expect("create legacy kv");
            conn.execute(
                "INSERT INTO kv(key, value) VALUES(?, ?)",
                (CURRENT_DOCUMENT_KEY, "\"old\""),
            )
            .expect("insert");
        }
        let conn = open_db(dir.path()).expect("open migrates");
        assert!(table_has_column(&conn, "kv", "updated_at").expect("pragma"));
        assert_eq!(current_document_id(&conn).expect("id").as_deref(), Some("old"));
    }

    #[test]
    fn unreadable_entry_is_skipped_and_kept() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = open_db(dir.path()).expect("open");
        kv_set_json(
            &conn,
            DOCUMENTS_KEY,
            &serde_json::json!({ "bad": 5, "good": { "studentName": "Ada" } }),
        )
        .expect("seed");

        let docs = load_documents(&conn).expect("load");
        assert_eq!(docs.keys().collect::<Vec<_>>(), vec!["good"]);
        assert_eq!(docs["good"].student_name, "Ada");

        save_document(&conn, "new", &Record::default()).expect("save despite bad entry");
        let raw = kv_get_json(&conn, DOCUMENTS_KEY).expect("read").expect("present");
        assert_eq!(raw["bad"], serde_json::json!(5));
        assert_eq!(load_documents(&conn).expect("load").len(), 2);
    }

    #[test]
    fn non_object_document_map_fails_to_save() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = open_db(dir.path()).expect("open");
        kv_set_json(&conn, DOCUMENTS_KEY, &serde_json::json!([1, 2])).expect("seed");
        assert!(load_documents(&conn).is_err());
        assert!(save_document(&conn, "x", &Record::default()).is_err());
        assert_eq!(current_document_id(&conn).expect("id"), None);
    }
}
