//! The timer registry: the single source of truth for pending events.
//!
//! One exclusive lock guards the map for every operation's map-touching
//! portion. Register validates before taking the lock, then performs the
//! duplicate check, the task spawn, and the record insertion inside one
//! critical section so a firing task can never run before its record is
//! visible to Cancel/Extend.
//!
//! The Cancel-vs-Fire race is resolved by lock-serialized deletion: a record
//! whose deadline has passed but which is still present belongs to a firing
//! task racing for the lock, so Cancel reports `AlreadyFired` and leaves the
//! deletion to the firing path. Abort is only ever issued against a record
//! whose deadline is still in the future, which means a task can never be
//! aborted after it has removed its own entry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::RegistryConfig;
use crate::delivery::{DeliverEvent, FiredEvent, WebhookClient};

/// Outcome of [`TimerRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Created,
    AlreadyExists,
    InvalidDuration,
}

/// Outcome of [`TimerRegistry::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    NotFound,
    /// The scheduled action fired (or is firing) before the cancel won the
    /// race; the firing path owns the deletion of the entry.
    AlreadyFired,
}

/// Outcome of [`TimerRegistry::extend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendOutcome {
    Extended { new_total: Duration },
    NotFound,
    InvalidDuration,
}

/// Registry value for one outstanding event.
struct TimerRecord {
    /// Stop-if-not-fired handle for the sleeping timer task.
    abort: AbortHandle,
    /// Total span of the currently active schedule.
    duration: Duration,
    /// Wall-clock stamp of the active schedule; restated in the delivery.
    init_time: DateTime<Utc>,
    /// Monotonic fire point. Extension moves this forward in place.
    deadline: Instant,
    /// Payload to emit, read at fire time under the lock.
    payload: String,
}

struct Shared {
    timers: Mutex<HashMap<String, TimerRecord>>,
    max_timeout: Duration,
    delivery: Arc<dyn DeliverEvent>,
    tracker: TaskTracker,
}

/// Concurrent map from event identifiers to live, cancellable timers.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct TimerRegistry {
    inner: Arc<Shared>,
}

impl TimerRegistry {
    /// Create a registry that hands fired events to `delivery`.
    pub fn new(max_timeout: Duration, delivery: Arc<dyn DeliverEvent>) -> Self {
        Self {
            inner: Arc::new(Shared {
                timers: Mutex::new(HashMap::new()),
                max_timeout,
                delivery,
                tracker: TaskTracker::new(),
            }),
        }
    }

    /// Create a registry delivering to the configured webhook destination.
    pub fn with_webhook(config: &RegistryConfig) -> Self {
        Self::new(
            config.max_timeout,
            Arc::new(WebhookClient::new(config.callback_url.clone())),
        )
    }

    /// Pure validation of a requested timeout, performed before any lock is
    /// taken: rejects non-positive values and values above the configured
    /// maximum.
    fn validate_timeout(&self, timeout_secs: i64) -> Option<Duration> {
        let secs = u64::try_from(timeout_secs).ok().filter(|&secs| secs > 0)?;
        let duration = Duration::from_secs(secs);
        (duration <= self.inner.max_timeout).then_some(duration)
    }

    /// Register a new event that fires after `timeout_secs`.
    pub async fn register(
        &self,
        event_id: &str,
        timeout_secs: i64,
        payload: String,
    ) -> RegisterOutcome {
        let Some(duration) = self.validate_timeout(timeout_secs) else {
            return RegisterOutcome::InvalidDuration;
        };

        let mut timers = self.inner.timers.lock().await;
        if timers.contains_key(event_id) {
            debug!(event_id, "existing timer attached with event");
            return RegisterOutcome::AlreadyExists;
        }

        let init_time = Utc::now();
        let deadline = Instant::now() + duration;
        // Spawned inside the critical section: the task's first action is to
        // take this same lock, so it cannot observe the map before the record
        // below is inserted.
        let abort = self
            .inner
            .tracker
            .spawn(fire_on_deadline(Arc::clone(&self.inner), event_id.to_string()))
            .abort_handle();

        timers.insert(
            event_id.to_string(),
            TimerRecord {
                abort,
                duration,
                init_time,
                deadline,
                payload,
            },
        );
        debug!(event_id, timeout_secs, "registered timer");
        RegisterOutcome::Created
    }

    /// Cancel a pending event if it has not yet fired.
    pub async fn cancel(&self, event_id: &str) -> CancelOutcome {
        let mut timers = self.inner.timers.lock().await;
        let Some(record) = timers.get(event_id) else {
            return CancelOutcome::NotFound;
        };

        if record.deadline <= Instant::now() {
            // The timer task has woken and is racing for this lock; it owns
            // the deletion of the entry.
            return CancelOutcome::AlreadyFired;
        }

        record.abort.abort();
        timers.remove(event_id);
        debug!(event_id, "cancelled timer");
        CancelOutcome::Cancelled
    }

    /// Snapshot of the time left before a pending event fires. `None` if the
    /// event is unknown (never registered, cancelled, or already fired).
    pub async fn remaining(&self, event_id: &str) -> Option<Duration> {
        let timers = self.inner.timers.lock().await;
        timers
            .get(event_id)
            .map(|record| record.deadline.saturating_duration_since(Instant::now()))
    }

    /// Extend a pending event so it fires `extra_secs` later than it would
    /// have. The new total (remaining + extra) must stay within the maximum.
    pub async fn extend(&self, event_id: &str, extra_secs: i64) -> ExtendOutcome {
        let mut timers = self.inner.timers.lock().await;
        let Some(record) = timers.get_mut(event_id) else {
            return ExtendOutcome::NotFound;
        };

        let Some(extra) = u64::try_from(extra_secs).ok().filter(|&secs| secs > 0) else {
            return ExtendOutcome::InvalidDuration;
        };

        let now = Instant::now();
        let remaining = record.deadline.saturating_duration_since(now);
        let Some(new_total) = remaining.checked_add(Duration::from_secs(extra)) else {
            return ExtendOutcome::InvalidDuration;
        };
        if new_total > self.inner.max_timeout {
            return ExtendOutcome::InvalidDuration;
        }

        // In-place reschedule: the sleeping task re-reads the deadline when it
        // wakes, so the moved deadline and refreshed init_time are what the
        // eventual delivery reports.
        record.deadline = now + new_total;
        record.duration = new_total;
        record.init_time = Utc::now();
        debug!(event_id, extra_secs, new_total_secs = new_total.as_secs(), "extended timer");
        ExtendOutcome::Extended { new_total }
    }

    /// Number of timers currently outstanding.
    pub async fn outstanding(&self) -> usize {
        self.inner.timers.lock().await.len()
    }

    /// Abort all pending timers and wait for in-flight firing callbacks to
    /// finish, so a delivery call never races process teardown.
    pub async fn shutdown(&self) {
        {
            let mut timers = self.inner.timers.lock().await;
            for (_, record) in timers.drain() {
                record.abort.abort();
            }
        }
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        info!("timer registry drained");
    }
}

/// Per-event timer task: sleep until the record's deadline, then fire.
///
/// Wakes may be spurious with respect to the *current* schedule (an extension
/// moves the deadline after the sleep was set up), so the task always re-reads
/// the record under the lock before acting. On firing, the entry is removed
/// and the lock released before any delivery I/O happens.
async fn fire_on_deadline(shared: Arc<Shared>, event_id: String) {
    loop {
        let deadline = {
            let timers = shared.timers.lock().await;
            match timers.get(&event_id) {
                Some(record) => record.deadline,
                // Cancelled between spawn and first poll.
                None => return,
            }
        };

        tokio::time::sleep_until(deadline).await;

        let fired = {
            let mut timers = shared.timers.lock().await;
            match timers.get(&event_id) {
                // Lost the race to a cancel.
                None => return,
                // Extended while we slept; sleep again until the new deadline.
                Some(record) if record.deadline > Instant::now() => continue,
                Some(_) => {}
            }
            timers.remove(&event_id)
        };

        let Some(record) = fired else { return };
        info!(event_id = %event_id, "emitting event");
        let event = FiredEvent {
            event_id: event_id.clone(),
            message: record.payload,
            time_initiated: record.init_time,
        };
        if let Err(err) = shared.delivery.deliver(event).await {
            warn!(event_id = %event_id, error = %err, "webhook delivery failed");
        }
        return;
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]

    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use tokio::time::sleep;

    use super::*;
    use crate::delivery::DeliveryError;

    /// Delivery sink that records every fired event it receives, optionally
    /// taking a while to do so.
    #[derive(Default)]
    struct RecordingDelivery {
        delay: Duration,
        events: StdMutex<Vec<FiredEvent>>,
    }

    impl RecordingDelivery {
        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                events: StdMutex::new(Vec::new()),
            }
        }

        fn fired(&self) -> Vec<FiredEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeliverEvent for RecordingDelivery {
        async fn deliver(&self, event: FiredEvent) -> Result<(), DeliveryError> {
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    fn registry(max_timeout_secs: u64) -> (TimerRegistry, Arc<RecordingDelivery>) {
        let delivery = Arc::new(RecordingDelivery::default());
        let registry = TimerRegistry::new(
            Duration::from_secs(max_timeout_secs),
            Arc::clone(&delivery) as Arc<dyn DeliverEvent>,
        );
        (registry, delivery)
    }

    fn secs(duration: Duration) -> f64 {
        duration.as_secs_f64()
    }

    #[tokio::test(start_paused = true)]
    async fn register_then_remaining_reports_full_duration() {
        let (registry, _) = registry(3600);

        let outcome = registry.register("a", 5, "x".to_string()).await;
        assert_eq!(outcome, RegisterOutcome::Created);

        let remaining = registry.remaining("a").await.unwrap();
        assert!((secs(remaining) - 5.0).abs() < 0.1, "remaining {remaining:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_registration_leaves_first_record_unchanged() {
        let (registry, delivery) = registry(3600);

        assert_eq!(
            registry.register("a", 5, "first".to_string()).await,
            RegisterOutcome::Created
        );
        assert_eq!(
            registry.register("a", 30, "second".to_string()).await,
            RegisterOutcome::AlreadyExists
        );

        // The first schedule is untouched by the rejected call.
        let remaining = registry.remaining("a").await.unwrap();
        assert!(secs(remaining) <= 5.0 + 0.1);

        sleep(Duration::from_secs(6)).await;
        let fired = delivery.fired();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].message, "first");
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_durations_are_rejected_before_any_state_change() {
        let (registry, _) = registry(10);

        for secs in [0, -1, 11, i64::MIN] {
            assert_eq!(
                registry.register("c", secs, "x".to_string()).await,
                RegisterOutcome::InvalidDuration,
                "timeout_secs {secs}"
            );
        }
        assert_eq!(registry.remaining("c").await, None);
        assert_eq!(registry.outstanding().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_immediately_after_register_succeeds() {
        let (registry, delivery) = registry(3600);

        registry.register("a", 5, "x".to_string()).await;
        assert_eq!(registry.cancel("a").await, CancelOutcome::Cancelled);
        assert_eq!(registry.remaining("a").await, None);

        // Nothing fires after the cancel.
        sleep(Duration::from_secs(10)).await;
        assert!(delivery.fired().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_expiry_never_reports_cancelled() {
        let (registry, delivery) = registry(3600);

        registry.register("a", 1, "x".to_string()).await;
        sleep(Duration::from_secs(2)).await;

        let outcome = registry.cancel("a").await;
        assert!(
            matches!(outcome, CancelOutcome::NotFound | CancelOutcome::AlreadyFired),
            "got {outcome:?}"
        );

        sleep(Duration::from_millis(50)).await;
        assert_eq!(registry.remaining("a").await, None);
        assert_eq!(delivery.fired().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_unknown_event_is_not_found() {
        let (registry, _) = registry(3600);
        assert_eq!(registry.cancel("nope").await, CancelOutcome::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn fires_and_delivers_payload_then_forgets_the_event() {
        let (registry, delivery) = registry(3600);

        registry.register("a", 5, "x".to_string()).await;
        sleep(Duration::from_secs(6)).await;

        assert_eq!(registry.remaining("a").await, None);
        assert_eq!(registry.outstanding().await, 0);

        let fired = delivery.fired();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].event_id, "a");
        assert_eq!(fired[0].message, "x");
    }

    #[tokio::test(start_paused = true)]
    async fn extend_adds_to_remaining_time() {
        let (registry, _) = registry(3600);

        registry.register("b", 3, "x".to_string()).await;
        let outcome = registry.extend("b", 3).await;
        let ExtendOutcome::Extended { new_total } = outcome else {
            panic!("got {outcome:?}");
        };
        assert!((secs(new_total) - 6.0).abs() < 0.1);

        let remaining = registry.remaining("b").await.unwrap();
        assert!(secs(remaining) > 5.5, "remaining {remaining:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn extend_past_max_is_rejected_and_schedule_untouched() {
        let (registry, _) = registry(10);

        registry.register("a", 5, "x".to_string()).await;
        sleep(Duration::from_secs(1)).await;

        // remaining ~4s; 4 + 7 exceeds the 10s cap
        assert_eq!(registry.extend("a", 7).await, ExtendOutcome::InvalidDuration);

        let remaining = registry.remaining("a").await.unwrap();
        assert!((secs(remaining) - 4.0).abs() < 0.1, "remaining {remaining:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn extend_with_nonpositive_extra_is_rejected() {
        let (registry, _) = registry(3600);

        registry.register("a", 5, "x".to_string()).await;
        assert_eq!(registry.extend("a", 0).await, ExtendOutcome::InvalidDuration);
        assert_eq!(registry.extend("a", -3).await, ExtendOutcome::InvalidDuration);
        assert_eq!(registry.extend("missing", 3).await, ExtendOutcome::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn extension_is_reflected_in_the_delivered_event() {
        let (registry, delivery) = registry(3600);

        registry.register("e", 3, "payload".to_string()).await;
        sleep(Duration::from_secs(1)).await;

        let before_extend = Utc::now();
        let outcome = registry.extend("e", 4).await;
        assert!(matches!(outcome, ExtendOutcome::Extended { .. }));

        // Fires at the extended deadline, not the original one.
        sleep(Duration::from_secs(3)).await;
        assert!(delivery.fired().is_empty(), "fired at the original deadline");

        sleep(Duration::from_secs(4)).await;
        let fired = delivery.fired();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].message, "payload");
        // init_time was refreshed by the extension.
        assert!(fired[0].time_initiated >= before_extend);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_vs_fire_race_has_exactly_one_winner() {
        let (registry, delivery) = registry(3600);
        let mut cancelled = 0usize;

        for trial in 0..25 {
            registry.register("r", 1, format!("trial-{trial}")).await;
            sleep(Duration::from_secs(1)).await;

            match registry.cancel("r").await {
                CancelOutcome::Cancelled => cancelled += 1,
                CancelOutcome::NotFound | CancelOutcome::AlreadyFired => {}
            }

            sleep(Duration::from_millis(50)).await;
            // Whichever path won, no stale record survives.
            assert_eq!(registry.remaining("r").await, None);
            assert_eq!(registry.outstanding().await, 0);
        }

        // Exactly one terminal transition per trial: every trial that was not
        // cancelled must have delivered.
        assert_eq!(delivery.fired().len() + cancelled, 25);
    }

    #[tokio::test(start_paused = true)]
    async fn outstanding_tracks_live_timers() {
        let (registry, _) = registry(3600);

        registry.register("a", 30, "x".to_string()).await;
        registry.register("b", 2, "y".to_string()).await;
        assert_eq!(registry.outstanding().await, 2);

        registry.cancel("a").await;
        assert_eq!(registry.outstanding().await, 1);

        sleep(Duration::from_secs(3)).await;
        assert_eq!(registry.outstanding().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_in_flight_delivery_to_finish() {
        let delivery = Arc::new(RecordingDelivery::slow(Duration::from_secs(5)));
        let registry = TimerRegistry::new(
            Duration::from_secs(3600),
            Arc::clone(&delivery) as Arc<dyn DeliverEvent>,
        );

        registry.register("a", 1, "x".to_string()).await;
        // Past the deadline: the record is gone and the delivery call is in
        // flight, sleeping inside the sink.
        sleep(Duration::from_millis(1100)).await;
        assert_eq!(registry.outstanding().await, 0);
        assert!(delivery.fired().is_empty());

        // Draining must block until the slow delivery completes.
        registry.shutdown().await;
        let fired = delivery.fired();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].event_id, "a");
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_aborts_pending_timers_without_delivering() {
        let (registry, delivery) = registry(3600);

        registry.register("a", 60, "x".to_string()).await;
        registry.register("b", 60, "y".to_string()).await;

        registry.shutdown().await;
        assert_eq!(registry.outstanding().await, 0);
        assert!(delivery.fired().is_empty());
    }
}
