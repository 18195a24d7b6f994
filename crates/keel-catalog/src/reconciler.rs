//! Detects tables recreated behind the catalog's back.
//!
//! A table can be dropped and recreated under the same name between the
//! catalog's last look at it and a deferred reload. Without this check the
//! reload would attribute the new incarnation's files to the old one.

use std::sync::Arc;

use futures::{TryStreamExt, future};

use crate::error::CatalogResult;
use crate::events::{EventId, EventLog};

/// Finds the newest creation event of a table.
#[derive(Clone)]
pub struct EventReconciler {
    log: Arc<dyn EventLog>,
}

impl std::fmt::Debug for EventReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventReconciler").finish_non_exhaustive()
    }
}

impl EventReconciler {
    /// Creates a reconciler reading `log`.
    #[must_use]
    pub fn new(log: Arc<dyn EventLog>) -> Self {
        Self { log }
    }

    /// Returns the ID of the newest `CREATE_TABLE` event for
    /// `db_name.table_name` after `from`, or `from` if there is none.
    ///
    /// If the log was compacted past `from`, the scan only sees what is left
    /// and `from` is kept when nothing newer matches.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the event log fails.
    pub async fn reconcile(
        &self,
        from: EventId,
        db_name: &str,
        table_name: &str,
    ) -> CatalogResult<EventId> {
        let latest = self
            .log
            .events_after(from)
            .try_filter(|event| future::ready(event.is_create_table_for(db_name, table_name)))
            .try_fold(from, |_, event| future::ready(Ok(event.event_id)))
            .await?;

        if latest == from {
            tracing::trace!(from, db = db_name, table = table_name, "no newer create event");
        } else {
            tracing::debug!(
                from,
                latest,
                db = db_name,
                table = table_name,
                "table was recreated; adopting newer create event"
            );
        }
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CREATE_TABLE, DROP_TABLE, MemoryEventLog, NotificationEvent};

    fn event(id: EventId, event_type: &str, db: &str, table: &str) -> NotificationEvent {
        NotificationEvent {
            event_id: id,
            event_type: event_type.into(),
            db_name: db.into(),
            table_name: table.into(),
        }
    }

    fn log_with(events: Vec<NotificationEvent>) -> MemoryEventLog {
        let log = MemoryEventLog::new();
        for e in events {
            log.append_with_id(e);
        }
        log
    }

    #[tokio::test]
    async fn test_adopts_newer_create_event() {
        let log = log_with(vec![
            event(5, CREATE_TABLE, "db", "t"),
            event(7, DROP_TABLE, "db", "t"),
            event(9, CREATE_TABLE, "DB", "T"),
        ]);
        let reconciler = EventReconciler::new(Arc::new(log));

        assert_eq!(reconciler.reconcile(5, "db", "t").await.expect("reconcile"), 9);
        assert_eq!(reconciler.reconcile(9, "db", "t").await.expect("reconcile"), 9);
    }

    #[tokio::test]
    async fn test_ignores_other_tables_and_event_types() {
        let log = log_with(vec![
            event(5, CREATE_TABLE, "db", "t"),
            event(6, CREATE_TABLE, "db", "other"),
            event(7, CREATE_TABLE, "other_db", "t"),
            event(8, DROP_TABLE, "db", "t"),
        ]);
        let reconciler = EventReconciler::new(Arc::new(log));
        assert_eq!(reconciler.reconcile(5, "db", "t").await.expect("reconcile"), 5);
    }

    #[tokio::test]
    async fn test_picks_last_of_several_matches() {
        let log = log_with(vec![
            event(3, CREATE_TABLE, "db", "t"),
            event(4, CREATE_TABLE, "db", "t"),
            event(10, CREATE_TABLE, "db", "t"),
        ]);
        let reconciler = EventReconciler::new(Arc::new(log));
        assert_eq!(reconciler.reconcile(1, "db", "t").await.expect("reconcile"), 10);
    }

    #[tokio::test]
    async fn test_compacted_log_keeps_known_id() {
        let log = log_with(vec![event(5, CREATE_TABLE, "db", "t")]);
        log.compact_through(5);
        let reconciler = EventReconciler::new(Arc::new(log));
        assert_eq!(reconciler.reconcile(2, "db", "t").await.expect("reconcile"), 2);
    }
}
