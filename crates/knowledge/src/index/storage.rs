//! SQLite persistence for the local vector index.
//!
//! Layout: `records(id, text, metadata, embedding)` with embeddings stored as
//! little-endian `f32` blobs, and `index_meta(key, value)` holding
//! `format_version`, `dimension` and the embedding fingerprint.

use crate::types::{DocumentUnit, Metadata};
use crate::vector_index::EmbeddingRecord;
use docchat_core::{AppError, AppResult};
use rusqlite::{params, Connection, OpenFlags};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const STORE_FILE: &str = "index.sqlite";
pub const FORMAT_VERSION: u32 = 1;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS index_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS records (
        id INTEGER PRIMARY KEY,
        text TEXT NOT NULL,
        metadata TEXT NOT NULL,
        embedding BLOB NOT NULL
    );
"#;

/// What a store file holds.
#[derive(Debug, Default)]
pub struct StoredIndex {
    pub dimension: Option<usize>,
    pub fingerprint: Option<String>,
    pub records: Vec<EmbeddingRecord>,
}

/// Read a store file. `Ok(None)` when it does not exist; anything that cannot
/// be decoded is [`AppError::CorruptIndex`].
pub fn load(path: &Path) -> AppResult<Option<StoredIndex>> {
    if !path.exists() {
        return Ok(None);
    }

    let corrupt = |e: &dyn std::fmt::Display| {
        AppError::CorruptIndex(format!("{}: {}", path.display(), e))
    };

    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| corrupt(&e))?;

    let meta = read_meta(&conn).map_err(|e| corrupt(&e))?;

    let version = meta
        .get("format_version")
        .and_then(|v| v.parse::<u32>().ok())
        .ok_or_else(|| corrupt(&"missing format version"))?;
    if version != FORMAT_VERSION {
        return Err(corrupt(&format!("unsupported format version {}", version)));
    }

    let dimension = match meta.get("dimension") {
        Some(value) => Some(
            value
                .parse::<usize>()
                .map_err(|_| corrupt(&format!("invalid dimension '{}'", value)))?,
        ),
        None => None,
    };

    let mut stmt = conn
        .prepare("SELECT id, text, metadata, embedding FROM records ORDER BY id")
        .map_err(|e| corrupt(&e))?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Vec<u8>>(3)?,
            ))
        })
        .map_err(|e| corrupt(&e))?;

    let mut records = Vec::new();
    for row in rows {
        let (id, text, metadata_json, embedding) = row.map_err(|e| corrupt(&e))?;

        let metadata: Metadata = serde_json::from_str(&metadata_json)
            .map_err(|e| corrupt(&format!("record {}: {}", id, e)))?;
        let vector = bytes_to_embedding(&embedding)
            .ok_or_else(|| corrupt(&format!("record {}: invalid embedding bytes", id)))?;

        if dimension.is_some_and(|d| d != vector.len()) {
            return Err(corrupt(&format!(
                "record {} has dimension {}, index has {:?}",
                id,
                vector.len(),
                dimension
            )));
        }

        records.push(EmbeddingRecord {
            id: id as u64,
            vector,
            chunk: DocumentUnit::new(text, metadata),
        });
    }

    tracing::debug!("Read {} records from {:?}", records.len(), path);

    Ok(Some(StoredIndex {
        dimension,
        fingerprint: meta.get("embedding").cloned(),
        records,
    }))
}

/// Append records to an existing (or new) store in one transaction.
pub fn append(
    path: &Path,
    records: &[EmbeddingRecord],
    dimension: Option<usize>,
    fingerprint: &str,
) -> AppResult<()> {
    ensure_parent(path)?;
    let mut conn = Connection::open(path).map_err(persistence)?;
    write_all(&mut conn, records, dimension, fingerprint)?;

    tracing::debug!("Appended {} records to {:?}", records.len(), path);
    Ok(())
}

/// Write a complete store to a temporary file and move it over `path`.
pub fn rewrite(
    path: &Path,
    records: &[EmbeddingRecord],
    dimension: Option<usize>,
    fingerprint: &str,
) -> AppResult<()> {
    ensure_parent(path)?;
    let tmp = temp_path(path);
    if tmp.exists() {
        fs::remove_file(&tmp).map_err(persistence)?;
    }

    {
        let mut conn = Connection::open(&tmp).map_err(persistence)?;
        write_all(&mut conn, records, dimension, fingerprint)?;
    }

    fs::rename(&tmp, path).map_err(persistence)?;

    tracing::debug!("Rewrote {:?} with {} records", path, records.len());
    Ok(())
}

fn write_all(
    conn: &mut Connection,
    records: &[EmbeddingRecord],
    dimension: Option<usize>,
    fingerprint: &str,
) -> AppResult<()> {
    conn.execute_batch(SCHEMA).map_err(persistence)?;

    let tx = conn.transaction().map_err(persistence)?;
    {
        let mut meta = tx
            .prepare("INSERT OR REPLACE INTO index_meta (key, value) VALUES (?1, ?2)")
            .map_err(persistence)?;
        meta.execute(params!["format_version", FORMAT_VERSION.to_string()])
            .map_err(persistence)?;
        meta.execute(params!["embedding", fingerprint])
            .map_err(persistence)?;
        if let Some(dimension) = dimension {
            meta.execute(params!["dimension", dimension.to_string()])
                .map_err(persistence)?;
        }

        let mut insert = tx
            .prepare("INSERT INTO records (id, text, metadata, embedding) VALUES (?1, ?2, ?3, ?4)")
            .map_err(persistence)?;
        for record in records {
            let metadata = serde_json::to_string(&record.chunk.metadata)?;
            insert
                .execute(params![
                    record.id as i64,
                    record.chunk.text,
                    metadata,
                    embedding_to_bytes(&record.vector),
                ])
                .map_err(persistence)?;
        }
    }
    tx.commit().map_err(persistence)?;
    Ok(())
}

fn read_meta(conn: &Connection) -> rusqlite::Result<HashMap<String, String>> {
    let mut stmt = conn.prepare("SELECT key, value FROM index_meta")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

fn ensure_parent(path: &Path) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            AppError::Persistence(format!("Failed to create index directory {:?}: {}", parent, e))
        })?;
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn persistence(e: impl std::fmt::Display) -> AppError {
    AppError::Persistence(e.to_string())
}

/// Convert embedding vector to bytes for storage.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert bytes back to embedding vector.
fn bytes_to_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }

    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}
