//! Timing tests for the scheduler's backoff driver.
//!
//! All tests run with a paused tokio clock, so every delay is observed exactly
//! and no test waits on wall-clock time.

use alerts_common::{BackoffPolicy, Scheduler, SchedulerError};
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Records the virtual time of every attempt and answers with `respond(attempt)`.
struct Recorder {
    started: Instant,
    calls: AtomicU32,
    offsets: Mutex<Vec<Duration>>,
}

impl Recorder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            started: Instant::now(),
            calls: AtomicU32::new(0),
            offsets: Mutex::new(Vec::new()),
        })
    }

    /// Record an attempt, returning its 1-based number
    fn hit(&self) -> u32 {
        self.offsets
            .lock()
            .unwrap()
            .push(Instant::now().duration_since(self.started));
        self.calls.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn offsets_ms(&self) -> Vec<u128> {
        self.offsets
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.as_millis())
            .collect()
    }
}

#[tokio::test(start_paused = true)]
async fn test_backoff_exhausts_after_max_attempts() {
    let scheduler = Scheduler::new();
    let recorder = Recorder::new();

    let action = {
        let recorder = Arc::clone(&recorder);
        move || {
            let recorder = Arc::clone(&recorder);
            async move {
                recorder.hit();
                Ok::<Option<u32>, io::Error>(None)
            }
        }
    };

    let result = scheduler
        .backoff(action, BackoffPolicy::new(Duration::from_millis(100), 3), "always empty")
        .unwrap()
        .await;

    match result {
        Err(SchedulerError::AttemptsExhausted { description, attempts }) => {
            assert_eq!(description, "always empty");
            assert_eq!(attempts, 4);
        }
        other => panic!("Expected AttemptsExhausted, got {other:?}"),
    }

    // Waits of 100, 200, 400 and 800 ms, accumulated.
    assert_eq!(recorder.offsets_ms(), vec![100, 300, 700, 1500]);
    assert_eq!(scheduler.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_unlimited_resolves_on_fifth_attempt() {
    let scheduler = Scheduler::new();
    let recorder = Recorder::new();

    let action = {
        let recorder = Arc::clone(&recorder);
        move || {
            let recorder = Arc::clone(&recorder);
            async move {
                let attempt = recorder.hit();
                Ok::<_, io::Error>((attempt == 5).then_some("connected"))
            }
        }
    };

    let value = scheduler
        .backoff(action, BackoffPolicy::new(Duration::from_millis(100), 0), "connect")
        .unwrap()
        .await
        .unwrap();

    assert_eq!(value, "connected");
    assert_eq!(recorder.calls(), 5);
    assert_eq!(recorder.offsets_ms(), vec![100, 300, 700, 1500, 3100]);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_retries_errors_like_empty_results() {
    let scheduler = Scheduler::new();
    let recorder = Recorder::new();

    let action = {
        let recorder = Arc::clone(&recorder);
        move || {
            let recorder = Arc::clone(&recorder);
            async move {
                match recorder.hit() {
                    1 => Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused")),
                    2 => Ok(None),
                    n => Ok(Some(n)),
                }
            }
        }
    };

    let value = scheduler
        .backoff(action, BackoffPolicy::new(Duration::from_millis(10), 5), "mixed")
        .unwrap()
        .await
        .unwrap();

    assert_eq!(value, 3);
    assert_eq!(recorder.offsets_ms(), vec![10, 30, 70]);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_without_base_delay_uses_default_growth() {
    let scheduler = Scheduler::new();
    let recorder = Recorder::new();

    let action = {
        let recorder = Arc::clone(&recorder);
        move || {
            let recorder = Arc::clone(&recorder);
            async move {
                recorder.hit();
                Ok::<Option<()>, io::Error>(None)
            }
        }
    };

    let policy = BackoffPolicy {
        base_delay: None,
        max_attempts: Some(2),
    };
    let result = scheduler.backoff(action, policy, "defaults").unwrap().await;

    assert!(matches!(result, Err(SchedulerError::AttemptsExhausted { attempts: 3, .. })));
    assert_eq!(recorder.offsets_ms(), vec![0, 2000, 6000]);
}

#[tokio::test(start_paused = true)]
async fn test_dispose_during_backoff_stops_attempts() {
    let scheduler = Scheduler::new();
    let recorder = Recorder::new();

    let action = {
        let recorder = Arc::clone(&recorder);
        move || {
            let recorder = Arc::clone(&recorder);
            async move {
                recorder.hit();
                Ok::<Option<()>, io::Error>(None)
            }
        }
    };

    let sequence = tokio::spawn(
        scheduler
            .backoff(action, BackoffPolicy::unlimited(Duration::from_millis(100)), "forever")
            .unwrap(),
    );

    // First attempt fires at 100 ms; the second is pending until 300 ms.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(recorder.calls(), 1);
    assert_eq!(scheduler.pending_count(), 1);

    scheduler.dispose();
    assert_eq!(scheduler.pending_count(), 0);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(recorder.calls(), 1);

    let outcome = sequence.await.unwrap();
    assert!(matches!(
        outcome,
        Err(SchedulerError::Cancelled { .. }) | Err(SchedulerError::Disposed)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_attempt_descriptions_are_numbered() {
    let scheduler = Scheduler::new();

    let scheduled = scheduler
        .schedule(|| async { Ok::<_, io::Error>(()) }, Duration::from_millis(5), "refresh, attempt 1")
        .unwrap();
    assert_eq!(scheduled.description(), "refresh, attempt 1");
    scheduled.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_backoff_counts_panicking_attempt_as_failure() {
    let scheduler = Scheduler::new();
    let recorder = Recorder::new();

    let action = {
        let recorder = Arc::clone(&recorder);
        move || {
            let recorder = Arc::clone(&recorder);
            async move {
                if recorder.hit() == 1 {
                    panic!("handshake blew up");
                }
                Ok::<_, io::Error>(Some("connected"))
            }
        }
    };

    let value = scheduler
        .backoff(action, BackoffPolicy::new(Duration::from_millis(100), 3), "connect")
        .unwrap()
        .await
        .unwrap();

    assert_eq!(value, "connected");
    assert_eq!(recorder.calls(), 2);
    assert_eq!(recorder.offsets_ms(), vec![100, 300]);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_action_reports_action_error() {
    let scheduler = Scheduler::new();

    let scheduled = scheduler
        .schedule(
            || async {
                if true {
                    panic!("boom");
                }
                Ok::<(), io::Error>(())
            },
            Duration::from_millis(5),
            "explode",
        )
        .unwrap();

    match scheduled.await {
        Err(error @ SchedulerError::Action { .. }) => {
            assert!(!error.is_terminal());
            assert!(error.to_string().contains("boom"));
        }
        other => panic!("Expected action error, got {other:?}"),
    }
    assert_eq!(scheduler.pending_count(), 0);
}
