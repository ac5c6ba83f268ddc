//! Local notification state fed by REST refreshes and push messages.
//!
//! State is published through a `tokio::sync::watch` channel so a badge or
//! list view always renders the last-known-good value, including while the
//! push channel is down. Every mutation is applied synchronously and is a
//! no-op (no publish) when nothing changed.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::models::notification::Notification;
use crate::realtime::PushMessage;

/// Snapshot of the notification list and counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationState {
    /// Known notifications, newest first.
    pub notifications: Vec<Notification>,
    /// Unread counter. Replaced by the server's value when one arrives.
    pub unread_count: u64,
    /// Ids selected for a bulk action.
    pub selected_ids: BTreeSet<i64>,
}

impl NotificationState {
    /// Notifications that have not been dismissed.
    pub fn active(&self) -> impl Iterator<Item = &Notification> {
        self.notifications.iter().filter(|n| !n.dismissed_status)
    }

    /// Look up a notification by id.
    #[must_use]
    pub fn get(&self, id: i64) -> Option<&Notification> {
        self.notifications.iter().find(|n| n.notification_id == id)
    }

    fn position(&self, id: i64) -> Option<usize> {
        self.notifications.iter().position(|n| n.notification_id == id)
    }
}

fn counts_as_unread(notification: &Notification) -> bool {
    !notification.read_status && !notification.dismissed_status
}

/// Shared notification state with change notification.
pub struct NotificationStore {
    tx: watch::Sender<Arc<NotificationState>>,
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(NotificationState::default()));
        Self { tx }
    }

    /// Receive every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<NotificationState>> {
        self.tx.subscribe()
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<NotificationState> {
        Arc::clone(&self.tx.borrow())
    }

    fn modify(&self, f: impl FnOnce(&mut NotificationState) -> bool) -> bool {
        self.tx.send_if_modified(|state| f(Arc::make_mut(state)))
    }

    /// Apply a push message. Returns whether the state changed.
    ///
    /// Delivery of the same message twice leaves the state as after the
    /// first delivery.
    pub fn apply_push(&self, message: &PushMessage) -> bool {
        let changed = match message {
            PushMessage::Notification(notification) => self.upsert(notification.clone()),
            PushMessage::UnreadCountUpdate(count) => self.set_unread_count(count.0),
            PushMessage::MarkAsRead(id) => self.mark_read(id.0),
            PushMessage::Dismiss(id) => self.dismiss(id.0),
        };
        debug!(kind = message.kind(), changed, "push message applied");
        changed
    }

    /// Insert a notification at the front, or merge it into the existing
    /// entry with the same id. The unread counter moves by the difference in
    /// unread contribution, so a repeated delivery does not count twice.
    pub fn upsert(&self, notification: Notification) -> bool {
        self.modify(|state| {
            let incoming = counts_as_unread(&notification);
            match state.position(notification.notification_id) {
                Some(idx) => {
                    if state.notifications[idx] == notification {
                        return false;
                    }
                    let previous = counts_as_unread(&state.notifications[idx]);
                    if notification.dismissed_status {
                        state.selected_ids.remove(&notification.notification_id);
                    }
                    state.notifications[idx] = notification;
                    match (previous, incoming) {
                        (true, false) => state.unread_count = state.unread_count.saturating_sub(1),
                        (false, true) => state.unread_count += 1,
                        _ => {}
                    }
                }
                None => {
                    state.notifications.insert(0, notification);
                    if incoming {
                        state.unread_count += 1;
                    }
                }
            }
            true
        })
    }

    /// Replace the unread counter.
    pub fn set_unread_count(&self, count: u64) -> bool {
        self.modify(|state| {
            if state.unread_count == count {
                return false;
            }
            state.unread_count = count;
            true
        })
    }

    /// Replace the list after a REST refresh and recount unread entries from
    /// it. Selection keeps only ids that are still present.
    pub fn replace_all(&self, notifications: Vec<Notification>) -> bool {
        self.modify(|state| {
            let unread = notifications.iter().filter(|n| counts_as_unread(n)).count();
            let unread = u64::try_from(unread).unwrap_or(u64::MAX);
            if state.notifications == notifications && state.unread_count == unread {
                return false;
            }
            state
                .selected_ids
                .retain(|id| notifications.iter().any(|n| n.notification_id == *id));
            state.notifications = notifications;
            state.unread_count = unread;
            true
        })
    }

    /// Flip the read flag of one notification. Unknown ids are ignored.
    pub fn mark_read(&self, id: i64) -> bool {
        self.modify(|state| {
            let Some(idx) = state.position(id) else {
                return false;
            };
            let notification = &mut state.notifications[idx];
            if notification.read_status {
                return false;
            }
            let was_unread = counts_as_unread(notification);
            notification.read_status = true;
            if notification.read_at.is_none() {
                notification.read_at = Some(chrono::Utc::now().to_rfc3339());
            }
            if was_unread {
                state.unread_count = state.unread_count.saturating_sub(1);
            }
            true
        })
    }

    /// Mark every notification read and zero the counter.
    pub fn mark_all_read(&self) -> bool {
        self.modify(|state| {
            let now = chrono::Utc::now().to_rfc3339();
            let mut changed = state.unread_count != 0;
            for notification in state.notifications.iter_mut().filter(|n| !n.read_status) {
                notification.read_status = true;
                notification.read_at.get_or_insert_with(|| now.clone());
                changed = true;
            }
            state.unread_count = 0;
            changed
        })
    }

    /// Flip the dismissed flag of one notification. Unknown ids are ignored.
    pub fn dismiss(&self, id: i64) -> bool {
        self.modify(|state| {
            let Some(idx) = state.position(id) else {
                return false;
            };
            let notification = &mut state.notifications[idx];
            if notification.dismissed_status {
                return false;
            }
            let was_unread = counts_as_unread(notification);
            notification.dismissed_status = true;
            if was_unread {
                state.unread_count = state.unread_count.saturating_sub(1);
            }
            state.selected_ids.remove(&id);
            true
        })
    }

    /// Put back a notification captured before an optimistic change.
    ///
    /// The counter is not overwritten, since a push may have replaced it
    /// meanwhile. It moves by the difference in unread contribution between
    /// the current entry and the restored one.
    pub fn restore(&self, notification: Notification) -> bool {
        self.modify(|state| {
            let Some(idx) = state.position(notification.notification_id) else {
                return false;
            };
            if state.notifications[idx] == notification {
                return false;
            }
            let current = counts_as_unread(&state.notifications[idx]);
            match (current, counts_as_unread(&notification)) {
                (true, false) => state.unread_count = state.unread_count.saturating_sub(1),
                (false, true) => state.unread_count = state.unread_count.saturating_add(1),
                _ => {}
            }
            state.notifications[idx] = notification;
            true
        })
    }

    /// Add an active notification to the selection.
    pub fn select(&self, id: i64) -> bool {
        self.modify(|state| {
            state.get(id).is_some_and(|n| !n.dismissed_status) && state.selected_ids.insert(id)
        })
    }

    /// Remove an id from the selection.
    pub fn deselect(&self, id: i64) -> bool {
        self.modify(|state| state.selected_ids.remove(&id))
    }

    /// Select when unselected, deselect otherwise.
    pub fn toggle(&self, id: i64) -> bool {
        if self.snapshot().selected_ids.contains(&id) {
            self.deselect(id)
        } else {
            self.select(id)
        }
    }

    /// Select every active notification.
    pub fn select_all_active(&self) -> bool {
        self.modify(|state| {
            let all: BTreeSet<i64> = state.active().map(|n| n.notification_id).collect();
            if state.selected_ids == all {
                return false;
            }
            state.selected_ids = all;
            true
        })
    }

    /// Empty the selection.
    pub fn clear_selection(&self) -> bool {
        self.modify(|state| {
            if state.selected_ids.is_empty() {
                return false;
            }
            state.selected_ids.clear();
            true
        })
    }
}
