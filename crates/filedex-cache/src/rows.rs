//! Row mapping between SQLite and domain types
//!
//! ## Type Mapping
//!
//! | Domain Type          | SQL Type | Strategy                                   |
//! |----------------------|----------|--------------------------------------------|
//! | EntryId, RecycleId   | TEXT     | UUID string via `.to_string()` / `FromStr` |
//! | ActorId              | TEXT     | String via `.as_str()` / `ActorId::new()`  |
//! | EntryKind            | TEXT     | `"file"` / `"folder"`                      |
//! | PathBuf              | TEXT     | Lossy UTF-8 string                         |
//! | DateTime<Utc>        | TEXT     | RFC 3339 via `to_rfc3339()`                |
//! | bool                 | INTEGER  | 0 / 1                                      |
//! | u64 sizes            | INTEGER  | `i64` cast                                 |

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use filedex_core::domain::{ActorId, Entry, EntryId, EntryKind, RecycleId, RecycleItem};

use crate::CacheError;

pub(crate) fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            CacheError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

fn parse<T>(s: &str, what: &str) -> Result<T, CacheError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    s.parse::<T>()
        .map_err(|e| CacheError::SerializationError(format!("Invalid {what} '{s}': {e}")))
}

fn parse_optional<T>(s: Option<String>, what: &str) -> Result<Option<T>, CacheError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    s.filter(|v| !v.is_empty())
        .map(|v| parse(&v, what))
        .transpose()
}

/// Reconstruct an Entry from a database row
pub(crate) fn entry_from_row(row: &SqliteRow) -> Result<Entry, CacheError> {
    let id: String = row.try_get("id")?;
    let parent_id: Option<String> = row.try_get("parent_id")?;
    let name: String = row.try_get("name")?;
    let kind: String = row.try_get("kind")?;
    let path: String = row.try_get("path")?;
    let size: i64 = row.try_get("size")?;
    let starred: bool = row.try_get("starred")?;
    let owner_id: String = row.try_get("owner_id")?;
    let created_at: String = row.try_get("created_at")?;
    let modified_at: String = row.try_get("modified_at")?;

    Ok(Entry::from_parts(
        parse::<EntryId>(&id, "entry id")?,
        name,
        parse::<EntryKind>(&kind, "entry kind")?,
        parse_optional::<EntryId>(parent_id, "parent id")?,
        PathBuf::from(path),
        size.max(0) as u64,
        starred,
        parse::<ActorId>(&owner_id, "owner id")?,
        parse_datetime(&created_at)?,
        parse_datetime(&modified_at)?,
    ))
}

/// Reconstruct a RecycleItem from a database row
pub(crate) fn recycle_item_from_row(row: &SqliteRow) -> Result<RecycleItem, CacheError> {
    let id: String = row.try_get("id")?;
    let entry_id: String = row.try_get("entry_id")?;
    let name: String = row.try_get("name")?;
    let kind: String = row.try_get("kind")?;
    let size: i64 = row.try_get("size")?;
    let owner_id: String = row.try_get("owner_id")?;
    let deleted_by: String = row.try_get("deleted_by")?;
    let deleted_at: String = row.try_get("deleted_at")?;
    let original_path: String = row.try_get("original_path")?;
    let relocated_path: String = row.try_get("relocated_path")?;
    let parent_hint: Option<String> = row.try_get("parent_hint")?;
    let parent_item: Option<String> = row.try_get("parent_item")?;

    Ok(RecycleItem::from_parts(
        parse::<RecycleId>(&id, "recycle id")?,
        parse::<EntryId>(&entry_id, "entry id")?,
        name,
        parse::<EntryKind>(&kind, "entry kind")?,
        size.max(0) as u64,
        parse::<ActorId>(&owner_id, "owner id")?,
        parse::<ActorId>(&deleted_by, "actor id")?,
        parse_datetime(&deleted_at)?,
        PathBuf::from(original_path),
        PathBuf::from(relocated_path),
        parse_optional::<EntryId>(parent_hint, "parent hint")?,
        parse_optional::<RecycleId>(parent_item, "parent item")?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_datetime_roundtrip() {
        let now = Utc::now();
        let parsed = parse_datetime(&now.to_rfc3339()).unwrap();
        assert_eq!(parsed, now);
    }

    #[test]
    fn test_parse_datetime_rejects_garbage() {
        assert!(matches!(
            parse_datetime("yesterday"),
            Err(CacheError::SerializationError(_))
        ));
    }

    #[test]
    fn test_parse_optional_treats_empty_as_none() {
        let parsed: Option<EntryId> = parse_optional(Some(String::new()), "id").unwrap();
        assert!(parsed.is_none());
        let parsed: Option<EntryId> = parse_optional(None, "id").unwrap();
        assert!(parsed.is_none());
    }
}
