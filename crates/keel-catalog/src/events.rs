//! Metastore notification event log.
//!
//! The metastore appends one event per metadata change, with strictly
//! increasing IDs. The catalog only reads it; a read is a bounded scan that
//! ends at the newest event present when the scan started.

use std::sync::{Arc, PoisonError, RwLock};

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};

use crate::error::CatalogResult;

/// Identifier of a notification event.
pub type EventId = i64;

/// Event type recorded when a table is created.
pub const CREATE_TABLE: &str = "CREATE_TABLE";

/// Event type recorded when a table is dropped.
pub const DROP_TABLE: &str = "DROP_TABLE";

/// One entry of the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Event ID.
    pub event_id: EventId,
    /// Event type, e.g. [`CREATE_TABLE`].
    pub event_type: String,
    /// Database the event applies to.
    pub db_name: String,
    /// Table the event applies to.
    pub table_name: String,
}

impl NotificationEvent {
    /// Returns true if this event created `db_name.table_name`.
    ///
    /// Names are compared case-insensitively.
    #[must_use]
    pub fn is_create_table_for(&self, db_name: &str, table_name: &str) -> bool {
        self.event_type == CREATE_TABLE
            && self.db_name.eq_ignore_ascii_case(db_name)
            && self.table_name.eq_ignore_ascii_case(table_name)
    }
}

/// Read access to the notification event log.
pub trait EventLog: Send + Sync + 'static {
    /// Streams events with IDs strictly greater than `from`, in ID order.
    ///
    /// The stream is finite.
    fn events_after(&self, from: EventId) -> BoxStream<'_, CatalogResult<NotificationEvent>>;
}

/// In-memory event log for testing.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventLog {
    inner: Arc<RwLock<LogInner>>,
}

#[derive(Debug, Default)]
struct LogInner {
    events: Vec<NotificationEvent>,
    // Survives compaction so IDs are never reused.
    last_id: EventId,
}

impl MemoryEventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event with the next free ID and returns that ID.
    pub fn append(&self, event_type: &str, db_name: &str, table_name: &str) -> EventId {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.last_id += 1;
        let event_id = inner.last_id;
        inner.events.push(NotificationEvent {
            event_id,
            event_type: event_type.to_string(),
            db_name: db_name.to_string(),
            table_name: table_name.to_string(),
        });
        event_id
    }

    /// Appends an event with an explicit ID.
    ///
    /// IDs not greater than the newest ID handed out are ignored.
    pub fn append_with_id(&self, event: NotificationEvent) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if event.event_id > inner.last_id {
            inner.last_id = event.event_id;
            inner.events.push(event);
        }
    }

    /// Discards events with IDs up to and including `event_id`.
    pub fn compact_through(&self, event_id: EventId) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .events
            .retain(|e| e.event_id > event_id);
    }
}

impl EventLog for MemoryEventLog {
    fn events_after(&self, from: EventId) -> BoxStream<'_, CatalogResult<NotificationEvent>> {
        let batch: Vec<_> = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .events
            .iter()
            .filter(|e| e.event_id > from)
            .cloned()
            .collect();
        stream::iter(batch.into_iter().map(Ok)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_events_after_is_exclusive() {
        let log = MemoryEventLog::new();
        let first = log.append(CREATE_TABLE, "db", "t");
        let second = log.append(DROP_TABLE, "db", "t");
        assert_eq!((first, second), (1, 2));

        let events: Vec<_> = log.events_after(first).try_collect().await.expect("events");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_id, second);
    }

    #[test]
    fn test_create_table_match_ignores_case() {
        let event = NotificationEvent {
            event_id: 7,
            event_type: CREATE_TABLE.into(),
            db_name: "Sales".into(),
            table_name: "ORDERS".into(),
        };
        assert!(event.is_create_table_for("sales", "orders"));
        assert!(!event.is_create_table_for("sales", "order"));
    }

    #[tokio::test]
    async fn test_compaction_drops_old_events() {
        let log = MemoryEventLog::new();
        for _ in 0..3 {
            log.append(CREATE_TABLE, "db", "t");
        }
        log.compact_through(2);
        let events: Vec<_> = log.events_after(0).try_collect().await.expect("events");
        assert_eq!(events.iter().map(|e| e.event_id).collect::<Vec<_>>(), vec![3]);

        log.append_with_id(NotificationEvent {
            event_id: 3,
            event_type: CREATE_TABLE.into(),
            db_name: "db".into(),
            table_name: "dup".into(),
        });
        log.compact_through(3);
        assert_eq!(log.append(CREATE_TABLE, "db", "t"), 4);
    }
}
