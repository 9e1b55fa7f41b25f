//! Object discovery above the watermark.
//!
//! Listing returns whatever order the backend likes (cloud stores list
//! lexicographically by key); batch selection re-orders by
//! `(modified_at, key)` so ties on the timestamp cannot skip objects.

use futures::StreamExt;
use tracing::debug;

use crate::error::StorageError;
use crate::storage::{ObjectEntry, StorageProvider};
use crate::watermark::Position;

/// Order, filter, and truncate listing entries into a load batch.
///
/// Keeps entries whose key ends with `suffix` and whose position is strictly
/// above `after`, sorts ascending by position, and truncates to `limit`.
pub fn select_batch(
    entries: Vec<ObjectEntry>,
    after: &Position,
    suffix: &str,
    limit: usize,
) -> Vec<Position> {
    let mut batch: Vec<Position> = entries
        .into_iter()
        .filter(|entry| entry.path.as_ref().ends_with(suffix))
        .map(|entry| Position::new(entry.modified_at, entry.path.to_string()))
        .filter(|position| position > after)
        .collect();

    batch.sort();
    batch.truncate(limit);
    batch
}

/// List the monitored prefix and select the next load batch.
pub async fn discover_above(
    storage: &StorageProvider,
    after: &Position,
    suffix: &str,
    limit: usize,
) -> Result<Vec<Position>, StorageError> {
    let mut entries = Vec::new();
    let mut stream = storage.list_entries().await?;

    while let Some(result) = stream.next().await {
        match result {
            Ok(entry) => entries.push(entry),
            // A missing prefix just means nothing has arrived yet
            Err(object_store::Error::NotFound { .. }) => continue,
            Err(e) => return Err(StorageError::ObjectStore { source: e }),
        }
    }

    let total = entries.len();
    let batch = select_batch(entries, after, suffix, limit);
    debug!(
        "Listed {} objects, selected {} above watermark {}",
        total,
        batch.len(),
        after
    );

    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn entry(key: &str, secs: i64) -> ObjectEntry {
        ObjectEntry {
            path: key.into(),
            modified_at: ts(secs),
        }
    }

    #[test]
    fn test_select_orders_by_modified_at() {
        let entries = vec![
            entry("c.json", 5),
            entry("a.json", 1),
            entry("b.json", 2),
        ];
        let batch = select_batch(entries, &Position::origin(), ".json", 10);
        let keys: Vec<&str> = batch.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["a.json", "b.json", "c.json"]);
    }

    #[test]
    fn test_select_breaks_ties_by_key() {
        let entries = vec![
            entry("b.json", 7),
            entry("a.json", 7),
            entry("c.json", 7),
        ];
        let batch = select_batch(entries, &Position::origin(), ".json", 10);
        let keys: Vec<&str> = batch.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["a.json", "b.json", "c.json"]);
    }

    #[test]
    fn test_select_strictly_above_watermark() {
        let entries = vec![
            entry("a.json", 1),
            entry("b.json", 2),
            entry("c.json", 5),
        ];
        let after = Position::new(ts(2), "b.json");
        let batch = select_batch(entries, &after, ".json", 10);
        let keys: Vec<&str> = batch.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["c.json"]);
    }

    #[test]
    fn test_select_includes_same_timestamp_larger_key() {
        let entries = vec![entry("a.json", 3), entry("b.json", 3)];
        let after = Position::new(ts(3), "a.json");
        let batch = select_batch(entries, &after, ".json", 10);
        let keys: Vec<&str> = batch.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["b.json"]);
    }

    #[test]
    fn test_select_truncates_to_limit() {
        let entries = vec![
            entry("a.json", 1),
            entry("b.json", 2),
            entry("c.json", 5),
        ];
        let batch = select_batch(entries, &Position::origin(), ".json", 2);
        let keys: Vec<&str> = batch.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["a.json", "b.json"]);
    }

    #[test]
    fn test_select_filters_suffix() {
        let entries = vec![
            entry("a.json", 1),
            entry("a.json.uploaded", 1),
            entry("notes.txt", 2),
        ];
        let batch = select_batch(entries, &Position::origin(), ".json", 10);
        let keys: Vec<&str> = batch.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["a.json"]);
    }

    #[test]
    fn test_select_empty_listing() {
        let batch = select_batch(Vec::new(), &Position::origin(), ".json", 10);
        assert!(batch.is_empty());
    }
}
