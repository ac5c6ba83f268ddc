//! Bounded, timer-driven notice queue.
//!
//! All state changes flow through [`NoticeStore::dispatch`], a synchronous
//! reducer. After each transition that changes the queue, every listener
//! receives the same [`NoticeSnapshot`] (pointer-equal `Arc`).
//!
//! Snapshots are delivered through a single FIFO in reducer order. A
//! dispatch that arrives while another caller is delivering, including one
//! made from inside a listener, is queued and delivered by that caller.
//!
//! Lifecycle of a notice: `absent → open → dismissed → absent`. Dismissal
//! schedules physical removal after [`NoticeConfig::remove_delay`]; at most
//! one removal is pending per notice id. Inserting past capacity evicts the
//! oldest notice immediately.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::debug;

use crate::config::NoticeConfig;
use crate::models::notice::{Notice, NoticeInput, NoticePatch};
use crate::timer::{Scheduler, TimerHandle};

/// Immutable view of the queue, newest notice first.
pub type NoticeSnapshot = Arc<Vec<Notice>>;

/// Callback invoked after every queue transition.
pub type NoticeListener = Arc<dyn Fn(&NoticeSnapshot) + Send + Sync>;

/// Reducer input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticeAction {
    /// Insert a notice at the front, evicting past capacity.
    Add(Notice),
    /// Patch an existing notice; unknown ids are ignored.
    Update {
        /// Target notice.
        id: String,
        /// Fields to change.
        patch: NoticePatch,
    },
    /// Close one notice, or all when `None`.
    Dismiss(Option<String>),
    /// Physically drop one notice, or all when `None`.
    Remove(Option<String>),
}

struct Inner {
    notices: NoticeSnapshot,
    listeners: Vec<(u64, NoticeListener)>,
    next_listener_id: u64,
    removal_timers: HashMap<String, TimerHandle>,
}

#[derive(Default)]
struct Delivery {
    pending: VecDeque<NoticeSnapshot>,
    draining: bool,
}

/// Process-wide notice queue.
pub struct NoticeStore {
    config: NoticeConfig,
    scheduler: Arc<dyn Scheduler>,
    next_id: AtomicU64,
    inner: Mutex<Inner>,
    delivery: Mutex<Delivery>,
    this: Weak<NoticeStore>,
}

impl NoticeStore {
    /// Create an empty queue.
    #[must_use]
    pub fn new(config: NoticeConfig, scheduler: Arc<dyn Scheduler>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            config,
            scheduler,
            next_id: AtomicU64::new(0),
            inner: Mutex::new(Inner {
                notices: Arc::new(Vec::new()),
                listeners: Vec::new(),
                next_listener_id: 0,
                removal_timers: HashMap::new(),
            }),
            delivery: Mutex::new(Delivery::default()),
            this: this.clone(),
        })
    }

    /// Queue configuration.
    #[must_use]
    pub fn config(&self) -> NoticeConfig {
        self.config
    }

    /// Current queue contents.
    #[must_use]
    pub fn snapshot(&self) -> NoticeSnapshot {
        Arc::clone(&self.lock().notices)
    }

    /// Enqueue a notice and return a handle for later mutation.
    pub fn push(&self, input: NoticeInput) -> NoticeHandle {
        let id = self.generate_id();
        self.dispatch(NoticeAction::Add(Notice {
            id: id.clone(),
            title: input.title,
            description: input.description,
            variant: input.variant,
            open: true,
        }));
        NoticeHandle {
            id,
            store: self.this.clone(),
        }
    }

    /// Patch a notice; a no-op when the id is not queued.
    pub fn update(&self, id: &str, patch: NoticePatch) {
        self.dispatch(NoticeAction::Update {
            id: id.to_owned(),
            patch,
        });
    }

    /// Close one notice (or every notice when `id` is `None`) and schedule
    /// its removal.
    pub fn dismiss(&self, id: Option<&str>) {
        self.dispatch(NoticeAction::Dismiss(id.map(str::to_owned)));
    }

    /// Drop one notice (or every notice when `id` is `None`) immediately.
    pub fn remove(&self, id: Option<&str>) {
        self.dispatch(NoticeAction::Remove(id.map(str::to_owned)));
    }

    /// Open-state callback used by rendering code; closing routes to
    /// [`dismiss`](Self::dismiss).
    pub fn set_open(&self, id: &str, open: bool) {
        if !open {
            self.dismiss(Some(id));
        }
    }

    /// Register a listener; it stays attached while the returned guard lives.
    pub fn subscribe(
        &self,
        listener: impl Fn(&NoticeSnapshot) + Send + Sync + 'static,
    ) -> Subscription {
        let mut inner = self.lock();
        let id = inner.next_listener_id;
        inner.next_listener_id += 1;
        inner.listeners.push((id, Arc::new(listener)));
        Subscription {
            id,
            store: self.this.clone(),
        }
    }

    /// Number of attached listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Number of removals currently scheduled.
    #[must_use]
    pub fn pending_removals(&self) -> usize {
        self.lock().removal_timers.len()
    }

    /// Cancel every pending removal and empty the queue without notifying
    /// listeners.
    pub fn clear(&self) {
        let mut inner = self.lock();
        for (_, timer) in inner.removal_timers.drain() {
            timer.cancel();
        }
        inner.notices = Arc::new(Vec::new());
    }

    /// Apply one reducer transition and fan the result out to listeners.
    pub fn dispatch(&self, action: NoticeAction) {
        debug!(?action, "notice queue dispatch");

        let to_schedule = {
            let mut inner = self.lock();
            let Some((next, to_schedule)) = self.reduce(&mut inner, action) else {
                return;
            };
            inner.notices = Arc::new(next);
            // Enqueued under the state lock so delivery order matches
            // reducer order.
            self.lock_delivery()
                .pending
                .push_back(Arc::clone(&inner.notices));
            to_schedule
        };

        for id in to_schedule {
            self.schedule_removal(id);
        }

        self.deliver();
    }

    /// Drain queued snapshots to listeners unless another caller already is.
    fn deliver(&self) {
        {
            let mut delivery = self.lock_delivery();
            if delivery.draining {
                return;
            }
            delivery.draining = true;
        }

        loop {
            let snapshot = {
                let mut delivery = self.lock_delivery();
                match delivery.pending.pop_front() {
                    Some(snapshot) => snapshot,
                    None => {
                        delivery.draining = false;
                        return;
                    }
                }
            };
            let listeners: Vec<NoticeListener> = self
                .lock()
                .listeners
                .iter()
                .map(|(_, l)| Arc::clone(l))
                .collect();
            for listener in listeners {
                listener(&snapshot);
            }
        }
    }

    /// Compute the next queue; `None` means the transition changed nothing.
    fn reduce(
        &self,
        inner: &mut Inner,
        action: NoticeAction,
    ) -> Option<(Vec<Notice>, Vec<String>)> {
        let current = inner.notices.as_slice();
        match action {
            NoticeAction::Add(notice) => {
                let mut next = Vec::with_capacity(current.len() + 1);
                next.push(notice);
                next.extend(current.iter().cloned());
                if next.len() > self.config.limit {
                    for evicted in next.drain(self.config.limit..) {
                        debug!(id = %evicted.id, "notice evicted at capacity");
                        if let Some(timer) = inner.removal_timers.remove(&evicted.id) {
                            timer.cancel();
                        }
                    }
                }
                Some((next, Vec::new()))
            }
            NoticeAction::Update { id, patch } => {
                let index = current.iter().position(|n| n.id == id)?;
                let mut next = current.to_vec();
                next[index].apply(patch);
                Some((next, Vec::new()))
            }
            NoticeAction::Dismiss(target) => {
                let mut to_schedule = Vec::new();
                let mut next = current.to_vec();
                let mut changed = false;
                for notice in &mut next {
                    if target.as_deref().is_none_or(|id| id == notice.id) {
                        changed |= notice.open;
                        notice.open = false;
                        if !inner.removal_timers.contains_key(&notice.id)
                            && !to_schedule.contains(&notice.id)
                        {
                            to_schedule.push(notice.id.clone());
                        }
                    }
                }
                (changed || !to_schedule.is_empty()).then_some((next, to_schedule))
            }
            NoticeAction::Remove(target) => {
                let next: Vec<Notice> = match target.as_deref() {
                    None => Vec::new(),
                    Some(id) => current.iter().filter(|n| n.id != id).cloned().collect(),
                };
                if next.len() == current.len() {
                    return None;
                }
                for removed in current.iter().filter(|n| !next.iter().any(|k| k.id == n.id)) {
                    if let Some(timer) = inner.removal_timers.remove(&removed.id) {
                        timer.cancel();
                    }
                }
                Some((next, Vec::new()))
            }
        }
    }

    fn schedule_removal(&self, id: String) {
        let mut inner = self.lock();
        if inner.removal_timers.contains_key(&id) {
            return;
        }

        let store = self.this.clone();
        let timer_id = id.clone();
        let handle = self.scheduler.schedule(
            self.config.remove_delay(),
            Box::new(move || {
                if let Some(store) = store.upgrade() {
                    store.lock().removal_timers.remove(&timer_id);
                    store.remove(Some(&timer_id));
                }
            }),
        );
        debug!(id = %id, delay = ?self.config.remove_delay(), "notice removal scheduled");
        inner.removal_timers.insert(id, handle);
    }

    fn generate_id(&self) -> String {
        // Wraps instead of overflowing; ids only need to be unique among live notices.
        let n = self.next_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        n.to_string()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_delivery(&self) -> MutexGuard<'_, Delivery> {
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle returned from [`NoticeStore::push`].
#[derive(Debug, Clone)]
pub struct NoticeHandle {
    id: String,
    store: Weak<NoticeStore>,
}

impl NoticeHandle {
    /// Identifier of the notice this handle controls.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Dismiss this notice.
    pub fn dismiss(&self) {
        if let Some(store) = self.store.upgrade() {
            store.dismiss(Some(&self.id));
        }
    }

    /// Patch this notice.
    pub fn update(&self, patch: NoticePatch) {
        if let Some(store) = self.store.upgrade() {
            store.update(&self.id, patch);
        }
    }
}

/// Listener registration guard; detaches the listener on drop.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    store: Weak<NoticeStore>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.lock().listeners.retain(|(id, _)| *id != self.id);
        }
    }
}
