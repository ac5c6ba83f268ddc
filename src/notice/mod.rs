//! Ephemeral notice (toast) queue.
//!
//! A single [`NoticeStore`] is shared by every view in the process. The
//! first call to [`global`] creates it with default settings; [`install`]
//! replaces it with a configured store and [`reset_global`] tears it down
//! so tests start from an empty queue.

pub mod store;

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

pub use store::{NoticeAction, NoticeHandle, NoticeListener, NoticeSnapshot, NoticeStore, Subscription};

use crate::config::NoticeConfig;
use crate::models::notice::NoticeInput;
use crate::timer::TokioScheduler;

static GLOBAL: OnceLock<Mutex<Option<Arc<NoticeStore>>>> = OnceLock::new();

fn slot() -> &'static Mutex<Option<Arc<NoticeStore>>> {
    GLOBAL.get_or_init(|| Mutex::new(None))
}

/// The process-wide notice queue, created on first use.
#[must_use]
pub fn global() -> Arc<NoticeStore> {
    let mut guard = slot().lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(guard.get_or_insert_with(|| {
        NoticeStore::new(NoticeConfig::default(), Arc::new(TokioScheduler::new()))
    }))
}

/// Replace the process-wide queue. Existing handles keep pointing at the
/// previous store.
pub fn install(store: Arc<NoticeStore>) {
    let previous = slot()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .replace(store);
    if let Some(previous) = previous {
        previous.clear();
    }
}

/// Drop the process-wide queue and cancel its pending removals.
pub fn reset_global() {
    let previous = slot().lock().unwrap_or_else(PoisonError::into_inner).take();
    if let Some(previous) = previous {
        previous.clear();
    }
}

/// Enqueue a notice on the process-wide queue.
pub fn toast(input: NoticeInput) -> NoticeHandle {
    global().push(input)
}
