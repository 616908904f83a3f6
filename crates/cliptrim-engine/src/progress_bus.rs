//! Process-wide progress registry.
//!
//! Each task has one slot holding its latest [`ProgressEvent`] and at most one
//! live sink. Publishing overwrites the snapshot and pushes to the sink in
//! publish order. A new subscription replaces the previous sink, which ends
//! the older stream. Events published while nobody is attached are not
//! replayed; a new subscriber receives the latest snapshot first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::debug;

use cliptrim_models::{ProgressEvent, TaskId, TaskStatus};

type Sink = mpsc::UnboundedSender<ProgressEvent>;

#[derive(Debug)]
struct Slot {
    snapshot: ProgressEvent,
    sink: Option<(u64, Sink)>,
    terminal_at: Option<Instant>,
}

/// Live subscription to one task's progress.
#[derive(Debug)]
pub struct Subscription {
    pub task_id: TaskId,
    /// Identifies this sink when detaching, so a stale stream cannot detach
    /// its replacement.
    pub generation: u64,
    pub receiver: mpsc::UnboundedReceiver<ProgressEvent>,
}

/// Registry keyed by task id.
///
/// Publishing happens from synchronous stage-output callbacks, so the map is
/// guarded by a std lock that is never held across an await.
#[derive(Debug, Default)]
pub struct ProgressBus {
    slots: RwLock<HashMap<TaskId, Slot>>,
    next_generation: AtomicU64,
    closed: AtomicBool,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<TaskId, Slot>> {
        self.slots.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<TaskId, Slot>> {
        self.slots.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create the slot for a new task with a `starting` snapshot.
    pub fn register(&self, task_id: &TaskId) {
        let snapshot = ProgressEvent::new(TaskStatus::Starting, 0, "Task accepted");
        self.write().insert(
            task_id.clone(),
            Slot {
                snapshot,
                sink: None,
                terminal_at: None,
            },
        );
    }

    /// Store `event` as the latest snapshot and push it to the live sink.
    ///
    /// Returns `false` if the task is unknown (never registered or evicted).
    pub fn publish(&self, task_id: &TaskId, event: ProgressEvent) -> bool {
        let mut slots = self.write();
        let Some(slot) = slots.get_mut(task_id) else {
            return false;
        };

        if event.is_terminal() && slot.terminal_at.is_none() {
            slot.terminal_at = Some(Instant::now());
        }

        if let Some((_, sink)) = &slot.sink {
            if sink.send(event.clone()).is_err() {
                debug!(task_id = %task_id, "Progress sink closed, detaching");
                slot.sink = None;
            }
        }
        slot.snapshot = event;
        true
    }

    /// Attach a new sink, replacing any existing one. The current snapshot is
    /// queued as the first event.
    pub fn subscribe(&self, task_id: &TaskId) -> Option<Subscription> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }

        let mut slots = self.write();
        let slot = slots.get_mut(task_id)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(slot.snapshot.clone());

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        if slot.sink.replace((generation, tx)).is_some() {
            debug!(task_id = %task_id, "Replaced existing progress subscriber");
        }

        Some(Subscription {
            task_id: task_id.clone(),
            generation,
            receiver: rx,
        })
    }

    /// Detach the sink if it still belongs to `generation`. The task keeps
    /// running and its snapshot stays queryable.
    pub fn unregister(&self, task_id: &TaskId, generation: u64) {
        if let Some(slot) = self.write().get_mut(task_id) {
            if matches!(slot.sink, Some((g, _)) if g == generation) {
                slot.sink = None;
            }
        }
    }

    pub fn snapshot(&self, task_id: &TaskId) -> Option<ProgressEvent> {
        self.read().get(task_id).map(|slot| slot.snapshot.clone())
    }

    /// Remove slots that reached a terminal state more than `ttl` ago.
    pub fn evict_expired(&self, ttl: Duration) -> usize {
        let mut slots = self.write();
        let before = slots.len();
        slots.retain(|_, slot| !slot.terminal_at.is_some_and(|at| at.elapsed() >= ttl));
        before - slots.len()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Number of tasks with a live sink.
    pub fn active_subscribers(&self) -> usize {
        self.read().values().filter(|slot| slot.sink.is_some()).count()
    }

    /// Drop every sink so open streams end, and refuse new subscriptions.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        for slot in self.write().values_mut() {
            slot.sink = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(progress: u8) -> ProgressEvent {
        ProgressEvent::new(TaskStatus::Downloading, progress, "Downloading")
    }

    #[test]
    fn test_publish_unknown_task() {
        let bus = ProgressBus::new();
        assert!(!bus.publish(&TaskId::new(), event(10)));
    }

    #[test]
    fn test_subscribe_gets_snapshot_then_updates_in_order() {
        let bus = ProgressBus::new();
        let id = TaskId::new();
        bus.register(&id);
        bus.publish(&id, event(5));
        bus.publish(&id, event(10));

        let mut sub = bus.subscribe(&id).unwrap();
        bus.publish(&id, event(20));
        bus.publish(&id, event(30));

        let seen: Vec<u8> = std::iter::from_fn(|| sub.receiver.try_recv().ok())
            .map(|e| e.progress)
            .collect();
        assert_eq!(seen, vec![10, 20, 30]);
    }

    #[test]
    fn test_second_subscriber_replaces_first() {
        let bus = ProgressBus::new();
        let id = TaskId::new();
        bus.register(&id);

        let mut first = bus.subscribe(&id).unwrap();
        let mut second = bus.subscribe(&id).unwrap();
        assert_ne!(first.generation, second.generation);

        bus.publish(&id, event(40));

        // Snapshot, then closed.
        assert!(first.receiver.try_recv().is_ok());
        assert!(matches!(
            first.receiver.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert_eq!(second.receiver.try_recv().unwrap().progress, 0);
        assert_eq!(second.receiver.try_recv().unwrap().progress, 40);

        // A stale stream detaching must not drop the live one.
        bus.unregister(&id, first.generation);
        assert_eq!(bus.active_subscribers(), 1);
        bus.unregister(&id, second.generation);
        assert_eq!(bus.active_subscribers(), 0);
    }

    #[test]
    fn test_snapshot_survives_unregister() {
        let bus = ProgressBus::new();
        let id = TaskId::new();
        bus.register(&id);
        let sub = bus.subscribe(&id).unwrap();
        bus.unregister(&id, sub.generation);

        bus.publish(&id, ProgressEvent::complete("clip.mp4"));
        let snapshot = bus.snapshot(&id).unwrap();
        assert_eq!(snapshot.status, TaskStatus::Complete);
        assert_eq!(snapshot.filename.as_deref(), Some("clip.mp4"));
    }

    #[test]
    fn test_evict_only_terminal_entries() {
        let bus = ProgressBus::new();
        let running = TaskId::new();
        let done = TaskId::new();
        bus.register(&running);
        bus.register(&done);
        bus.publish(&done, ProgressEvent::error("boom"));

        assert_eq!(bus.evict_expired(Duration::from_secs(60)), 0);
        assert_eq!(bus.evict_expired(Duration::ZERO), 1);
        assert!(bus.snapshot(&done).is_none());
        assert!(bus.snapshot(&running).is_some());
    }

    #[test]
    fn test_shutdown_closes_streams() {
        let bus = ProgressBus::new();
        let id = TaskId::new();
        bus.register(&id);
        let mut sub = bus.subscribe(&id).unwrap();

        bus.shutdown();

        assert!(sub.receiver.try_recv().is_ok());
        assert!(matches!(
            sub.receiver.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert!(bus.subscribe(&id).is_none());
    }
}
