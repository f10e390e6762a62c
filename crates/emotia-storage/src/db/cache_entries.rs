//! Cache entry database operations

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use super::helpers::parse_datetime;
use crate::models::CacheEntry;

/// Read a single cache entry by key
pub fn read_cache_entry(conn: &Connection, key: &str) -> Result<Option<CacheEntry>> {
    let row = conn
        .query_row(
            "SELECT emotion, scores, created_at, ttl_secs FROM cache_entries WHERE key = ?1",
            [key],
            |row| {
                let emotion: String = row.get(0)?;
                let scores: String = row.get(1)?;
                let created_at: String = row.get(2)?;
                let ttl_secs: i64 = row.get(3)?;
                Ok((emotion, scores, parse_datetime(&created_at)?, ttl_secs))
            },
        )
        .optional()?;

    match row {
        Some((emotion, scores, created_at, ttl_secs)) => Ok(Some(CacheEntry {
            emotion,
            scores: serde_json::from_str(&scores)?,
            created_at,
            ttl_secs: u64::try_from(ttl_secs).unwrap_or(0),
        })),
        None => Ok(None),
    }
}

/// Insert or replace the entry stored under `key`
pub fn write_cache_entry(conn: &Connection, key: &str, entry: &CacheEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO cache_entries (key, emotion, scores, created_at, ttl_secs)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(key) DO UPDATE SET
            emotion = excluded.emotion,
            scores = excluded.scores,
            created_at = excluded.created_at,
            ttl_secs = excluded.ttl_secs",
        params![
            key,
            entry.emotion,
            serde_json::to_string(&entry.scores)?,
            entry.created_at.to_rfc3339(),
            i64::try_from(entry.ttl_secs).unwrap_or(i64::MAX),
        ],
    )?;
    Ok(())
}

/// Delete the given keys, returning how many rows were removed
pub fn delete_cache_entries(conn: &Connection, keys: &[String]) -> Result<usize> {
    let mut removed = 0;
    let mut stmt = conn.prepare("DELETE FROM cache_entries WHERE key = ?1")?;
    for key in keys {
        removed += stmt.execute([key])?;
    }
    Ok(removed)
}

/// List every key starting with `prefix`
pub fn cache_keys_with_prefix(conn: &Connection, prefix: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT key FROM cache_entries WHERE substr(key, 1, ?2) = ?1")?;
    let prefix_len = i64::try_from(prefix.chars().count())?;
    let keys = stmt
        .query_map(params![prefix, prefix_len], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(keys)
}
