//! Timers driven by the app loop: the cancellable pull continuation and the
//! coalescing render flag.
//!
//! Nothing here sleeps or spawns. The loop calls `tick(now)` and acts on what
//! comes back, so tests drive time explicitly.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Cancel flag shared with whoever scheduled the task
#[derive(Debug, Clone, Default)]
pub struct TaskHandle {
    cancelled: Arc<AtomicBool>,
}

impl TaskHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Single pending delayed action. Scheduling again replaces the pending one
/// and cancels its handle.
///
/// ```ignore
/// // After a frame arrives in pull mode:
/// task.schedule(next_frame, now + delay);
///
/// // In the loop:
/// if let Some(frame) = task.tick(Instant::now()) {
///     controller.get_frame(frame, scope, now)?;
/// }
/// ```
#[derive(Debug)]
pub struct ScheduledTask<T> {
    pending: Option<(T, Instant, TaskHandle)>,
}

impl<T> Default for ScheduledTask<T> {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl<T: Copy + std::fmt::Debug> ScheduledTask<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, payload: T, due: Instant) -> TaskHandle {
        self.cancel();
        let handle = TaskHandle::default();
        log::trace!("ScheduledTask: {:?} due in {:?}", payload, due.saturating_duration_since(Instant::now()));
        self.pending = Some((payload, due, handle.clone()));
        handle
    }

    pub fn schedule_in(&mut self, payload: T, now: Instant, delay: Duration) -> TaskHandle {
        self.schedule(payload, now + delay)
    }

    pub fn cancel(&mut self) {
        if let Some((payload, _, handle)) = self.pending.take() {
            log::trace!("ScheduledTask: cancelled {:?}", payload);
            handle.cancel();
        }
    }

    /// Payload once due; a task cancelled through its handle is dropped
    pub fn tick(&mut self, now: Instant) -> Option<T> {
        let (payload, due, handle) = self.pending.as_ref()?;
        if handle.is_cancelled() {
            self.pending = None;
            return None;
        }
        if now >= *due {
            let payload = *payload;
            self.pending = None;
            return Some(payload);
        }
        None
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|(_, _, h)| !h.is_cancelled())
    }

    pub fn due_at(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, due, _)| *due)
    }
}

/// Redraw coalescing: any number of `request()` calls yield one draw
#[derive(Debug, Default)]
pub struct RenderScheduler {
    dirty: bool,
    draws: u64,
}

impl RenderScheduler {
    pub fn request(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// True at most once per request burst
    pub fn take(&mut self) -> bool {
        if self.dirty {
            self.dirty = false;
            self.draws += 1;
            true
        } else {
            false
        }
    }

    pub fn draws(&self) -> u64 {
        self.draws
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_due_yet() {
        let now = Instant::now();
        let mut task = ScheduledTask::new();
        task.schedule_in(5u32, now, Duration::from_millis(30));
        assert!(task.is_pending());
        assert_eq!(task.tick(now), None);
        assert_eq!(task.tick(now + Duration::from_millis(30)), Some(5));
        assert!(!task.is_pending());
        assert_eq!(task.tick(now + Duration::from_millis(60)), None);
    }

    #[test]
    fn test_reschedule_replaces() {
        let now = Instant::now();
        let mut task = ScheduledTask::new();
        let first = task.schedule_in(1u32, now, Duration::from_millis(10));
        task.schedule_in(2u32, now, Duration::from_millis(20));
        assert!(first.is_cancelled());
        assert_eq!(task.tick(now + Duration::from_millis(15)), None);
        assert_eq!(task.tick(now + Duration::from_millis(20)), Some(2));
    }

    #[test]
    fn test_cancel_via_handle() {
        let now = Instant::now();
        let mut task = ScheduledTask::new();
        let handle = task.schedule_in(1u32, now, Duration::from_millis(1));
        handle.cancel();
        assert!(!task.is_pending());
        assert_eq!(task.tick(now + Duration::from_secs(1)), None);
    }

    #[test]
    fn test_render_coalesces() {
        let mut r = RenderScheduler::default();
        assert!(!r.take());
        r.request();
        r.request();
        r.request();
        assert!(r.take());
        assert!(!r.take());
        assert_eq!(r.draws(), 1);
    }
}
