use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::{
    Completion, Event, EventKind, Governor, GovernorConfig, GovernorError, Operation, Priority,
    Subscribe, UpstreamError,
};

type Log = Arc<Mutex<Vec<(&'static str, Instant)>>>;

fn cfg() -> GovernorConfig {
    GovernorConfig {
        max_requests_per_window: 0,
        max_concurrent_per_tenant: 0,
        min_interval: Duration::from_millis(100),
        inter_item_delay: Duration::ZERO,
        tenant_idle_ttl: Duration::ZERO,
        ..GovernorConfig::default()
    }
}

/// Operation recording its name and start time, then succeeding.
fn record(log: &Log, name: &'static str) -> impl Operation<&'static str> {
    let log = Arc::clone(log);
    move || {
        let log = Arc::clone(&log);
        async move {
            log.lock().unwrap().push((name, Instant::now()));
            Ok(name)
        }
    }
}

/// Like [`record`], but takes `dur` before succeeding.
fn record_slow(log: &Log, name: &'static str, dur: Duration) -> impl Operation<&'static str> {
    let log = Arc::clone(log);
    move || {
        let log = Arc::clone(&log);
        async move {
            log.lock().unwrap().push((name, Instant::now()));
            time::sleep(dur).await;
            Ok(name)
        }
    }
}

/// Fails with `status` for the first `failures` calls, then succeeds.
fn flaky(calls: &Arc<AtomicU32>, failures: u32, status: u16) -> impl Operation<u32> {
    let calls = Arc::clone(calls);
    move || {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if n <= failures {
                Err(UpstreamError::with_status(status, "upstream said no"))
            } else {
                Ok(n)
            }
        }
    }
}

fn spawn_execute<T: Send + 'static>(
    gov: &Governor<T>,
    tenant: &'static str,
    priority: Option<Priority>,
    op: impl Operation<T>,
) -> JoinHandle<Result<Completion<T>, GovernorError>> {
    let gov = gov.clone();
    tokio::spawn(async move { gov.execute(tenant, priority, op).await })
}

async fn wait_for(rx: &mut broadcast::Receiver<Event>, kind: EventKind) -> Event {
    loop {
        let ev = rx.recv().await.expect("bus closed");
        if ev.kind == kind {
            return ev;
        }
    }
}

fn names(log: &Log) -> Vec<&'static str> {
    log.lock().unwrap().iter().map(|(n, _)| *n).collect()
}

#[tokio::test(start_paused = true)]
async fn three_per_minute_rejects_the_fourth_and_paces_the_rest() {
    let gov = Governor::new(GovernorConfig {
        max_requests_per_window: 3,
        min_interval: Duration::from_secs(1),
        ..cfg()
    })
    .unwrap();
    let log = Log::default();
    let mut rx = gov.subscribe();

    let mut handles = Vec::new();
    for name in ["a", "b", "c"] {
        handles.push(spawn_execute(&gov, "u1", None, record(&log, name)));
        wait_for(&mut rx, EventKind::Enqueued).await;
    }

    let err = gov.submit("u1", None, record(&log, "d")).await.unwrap_err();
    match err {
        GovernorError::RateLimitExceeded {
            limit, retry_after, ..
        } => {
            assert_eq!(limit, 3);
            assert!(retry_after <= Duration::from_secs(60));
            assert!(retry_after > Duration::ZERO);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(err_status(&gov).await, 429);

    for h in handles {
        h.await.unwrap().unwrap();
    }
    assert_eq!(names(&log), vec!["a", "b", "c"]);

    let log = log.lock().unwrap();
    for pair in log.windows(2) {
        assert!(pair[1].1 - pair[0].1 >= Duration::from_secs(1));
    }
}

async fn err_status(gov: &Governor<&'static str>) -> u16 {
    let log = Log::default();
    gov.submit("u1", None, record(&log, "e"))
        .await
        .unwrap_err()
        .http_status()
}

#[tokio::test(start_paused = true)]
async fn retries_transient_failures_until_success() {
    let gov = Governor::new(cfg()).unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let mut rx = gov.subscribe();
    let start = Instant::now();

    let handle = spawn_execute(&gov, "u1", None, flaky(&calls, 2, 503));

    wait_for(&mut rx, EventKind::RetryScheduled).await;
    let stats = gov.stats();
    assert_eq!(stats.pending_retries, 1);
    assert!(stats.is_draining);
    assert_eq!(stats.in_flight, 1);

    let done = handle.await.unwrap().unwrap();
    assert_eq!(done.value, 3);
    assert_eq!(done.attempts, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // 1s + 2s of backoff.
    assert!(start.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn terminal_errors_are_not_retried() {
    let gov = Governor::new(cfg()).unwrap();
    let calls = Arc::new(AtomicU32::new(0));

    let err = gov.submit("u1", None, flaky(&calls, 10, 401)).await.unwrap_err();
    assert!(matches!(
        err,
        GovernorError::TerminalUpstream {
            status: Some(401),
            ..
        }
    ));
    assert_eq!(err.http_status(), 401);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_wrap_the_last_error() {
    let gov = Governor::new(cfg()).unwrap();
    let calls = Arc::new(AtomicU32::new(0));

    let err = gov.submit("u1", None, flaky(&calls, u32::MAX, 503)).await.unwrap_err();
    match &err {
        GovernorError::RetriesExhausted { attempts, last } => {
            assert_eq!(*attempts, 4);
            assert!(matches!(**last, GovernorError::TransientUpstream { .. }));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(err.http_status(), 503);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn dispatch_follows_priority_then_arrival() {
    let gov = Governor::new(cfg()).unwrap();
    let log = Log::default();
    let mut rx = gov.subscribe();

    let blocker = spawn_execute(&gov, "u0", None, record_slow(&log, "blocker", Duration::from_secs(1)));
    wait_for(&mut rx, EventKind::Dispatched).await;

    let mut handles = vec![blocker];
    for (name, prio) in [("x", 5), ("y", 1), ("z", 5), ("w", 1), ("v", 3)] {
        handles.push(spawn_execute(&gov, "u1", Some(prio), record(&log, name)));
        wait_for(&mut rx, EventKind::Enqueued).await;
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }

    assert_eq!(names(&log), vec!["blocker", "y", "w", "v", "x", "z"]);
}

#[tokio::test(start_paused = true)]
async fn due_retry_goes_before_later_arrival() {
    let gov = Governor::new(cfg()).unwrap();
    let log = Log::default();
    let mut rx = gov.subscribe();

    let a_calls = Arc::new(AtomicU32::new(0));
    let a = {
        let log = Arc::clone(&log);
        let calls = Arc::clone(&a_calls);
        move || {
            let log = Arc::clone(&log);
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                log.lock().unwrap().push(("A", Instant::now()));
                if n == 0 {
                    Err(UpstreamError::with_status(503, "busy"))
                } else {
                    Ok("A")
                }
            }
        }
    };

    let ha = spawn_execute(&gov, "u1", None, a);
    wait_for(&mut rx, EventKind::Enqueued).await;
    let hb = spawn_execute(&gov, "u2", None, record_slow(&log, "B", Duration::from_secs(5)));
    wait_for(&mut rx, EventKind::Enqueued).await;

    time::sleep(Duration::from_millis(500)).await;
    let hc = spawn_execute(&gov, "u3", None, record(&log, "C"));

    let a = ha.await.unwrap().unwrap();
    hb.await.unwrap().unwrap();
    hc.await.unwrap().unwrap();

    assert_eq!(names(&log), vec!["A", "B", "A", "C"]);
    assert_eq!(a.attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn pacing_survives_idle_periods() {
    let gov = Governor::new(GovernorConfig {
        min_interval: Duration::from_secs(2),
        ..cfg()
    })
    .unwrap();
    let log = Log::default();

    gov.submit("u1", None, record(&log, "first")).await.unwrap();
    gov.submit("u1", None, record(&log, "second")).await.unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log[1].1 - log[0].1, Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn inter_item_delay_applies_only_with_queued_work() {
    let gov = Governor::new(GovernorConfig {
        min_interval: Duration::ZERO,
        inter_item_delay: Duration::from_millis(300),
        ..cfg()
    })
    .unwrap();
    let log = Log::default();
    let mut rx = gov.subscribe();

    let h1 = spawn_execute(&gov, "u1", None, record_slow(&log, "one", Duration::from_secs(1)));
    wait_for(&mut rx, EventKind::Dispatched).await;
    let h2 = spawn_execute(&gov, "u1", None, record(&log, "two"));
    wait_for(&mut rx, EventKind::Enqueued).await;
    h1.await.unwrap().unwrap();
    h2.await.unwrap().unwrap();

    let start = Instant::now();
    gov.submit("u1", None, record(&log, "three")).await.unwrap();
    assert!(start.elapsed() < Duration::from_millis(300));

    let log = log.lock().unwrap();
    assert!(log[1].1 - log[0].1 >= Duration::from_millis(1300));
}

#[tokio::test(start_paused = true)]
async fn hanging_operation_times_out() {
    let gov: Governor<()> = Governor::new(GovernorConfig {
        timeout: Duration::from_secs(2),
        max_retries: 0,
        ..cfg()
    })
    .unwrap();

    let start = Instant::now();
    let err = gov
        .submit("u1", None, || async {
            std::future::pending::<Result<(), UpstreamError>>().await
        })
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    match err {
        GovernorError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 1);
            assert!(matches!(*last, GovernorError::Timeout { .. }));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(elapsed >= Duration::from_secs(2));
    assert!(elapsed < Duration::from_secs(2) + Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn in_flight_is_released_on_every_outcome() {
    let gov = Governor::new(cfg()).unwrap();
    let ok = Arc::new(AtomicU32::new(0));
    let bad = Arc::new(AtomicU32::new(0));

    gov.submit("u1", None, flaky(&ok, 0, 503)).await.unwrap();
    gov.submit("u1", None, flaky(&bad, 10, 400)).await.unwrap_err();

    let stats = gov.stats();
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.tenants.len(), 1);
    assert_eq!(stats.tenants[0].in_flight, 0);
    assert_eq!(stats.tenants[0].count, 2);
    assert_eq!(stats.queue_length, 0);
    assert_eq!(stats.pending_retries, 0);
}

#[tokio::test(start_paused = true)]
async fn over_concurrency_tenant_is_delayed_not_rejected() {
    let gov = Governor::new(GovernorConfig {
        max_concurrent_per_tenant: 1,
        concurrency_delay: Duration::from_millis(500),
        ..cfg()
    })
    .unwrap();
    let log = Log::default();
    let mut rx = gov.subscribe();

    let blocker = spawn_execute(&gov, "u1", None, record_slow(&log, "slow", Duration::from_secs(10)));
    wait_for(&mut rx, EventKind::Dispatched).await;

    let second = spawn_execute(&gov, "u1", None, record(&log, "next"));
    let delayed = wait_for(&mut rx, EventKind::AdmissionDelayed).await;
    assert_eq!(delayed.delay_ms, Some(500));
    let delayed_at = Instant::now();

    wait_for(&mut rx, EventKind::Enqueued).await;
    assert!(Instant::now() - delayed_at >= Duration::from_millis(500));

    blocker.await.unwrap().unwrap();
    second.await.unwrap().unwrap();
    assert_eq!(names(&log), vec!["slow", "next"]);
}

#[tokio::test(start_paused = true)]
async fn idle_tenants_are_evicted() {
    let gov = Governor::new(GovernorConfig {
        max_requests_per_window: 5,
        window: Duration::from_secs(1),
        tenant_idle_ttl: Duration::from_secs(1),
        ..cfg()
    })
    .unwrap();
    let log = Log::default();
    let mut rx = gov.subscribe();

    gov.submit("old", None, record(&log, "old")).await.unwrap();
    time::sleep(Duration::from_secs(3)).await;
    gov.submit("new", None, record(&log, "new")).await.unwrap();

    let evicted = wait_for(&mut rx, EventKind::TenantsEvicted).await;
    assert_eq!(evicted.count, Some(1));

    let tenants: Vec<_> = gov.stats().tenants.into_iter().map(|t| t.tenant).collect();
    assert_eq!(tenants.len(), 1);
    assert_eq!(tenants[0].as_str(), "new");
}

#[tokio::test(start_paused = true)]
async fn shutdown_resolves_everyone_with_closed() {
    let gov = Governor::new(cfg()).unwrap();
    let log = Log::default();
    let mut rx = gov.subscribe();

    let running = spawn_execute(&gov, "u1", None, record_slow(&log, "running", Duration::from_secs(10)));
    wait_for(&mut rx, EventKind::Dispatched).await;
    let queued = spawn_execute(&gov, "u2", None, record(&log, "queued"));
    wait_for(&mut rx, EventKind::Enqueued).await;

    gov.shutdown();
    let shutdown = wait_for(&mut rx, EventKind::ShutdownRequested).await;
    assert_eq!(shutdown.count, Some(1));

    assert!(matches!(running.await.unwrap(), Err(GovernorError::Closed)));
    assert!(matches!(queued.await.unwrap(), Err(GovernorError::Closed)));
    assert!(gov.is_closed());

    let err = gov.submit("u1", None, record(&log, "late")).await.unwrap_err();
    assert!(matches!(err, GovernorError::Closed));
    assert_eq!(err.http_status(), 503);
    assert_eq!(gov.stats().in_flight, 0);
    assert_eq!(names(&log), vec!["running"]);
}

#[tokio::test(start_paused = true)]
async fn stats_serialize_to_camel_case() {
    let gov = Governor::new(GovernorConfig {
        max_requests_per_window: 3,
        window: Duration::from_secs(60),
        ..cfg()
    })
    .unwrap();
    let log = Log::default();
    gov.submit("u1", None, record(&log, "a")).await.unwrap();

    let json = serde_json::to_value(gov.stats()).unwrap();
    assert_eq!(json["queueLength"], 0);
    assert_eq!(json["pendingRetries"], 0);
    assert_eq!(json["isDraining"], false);
    assert_eq!(json["inFlight"], 0);
    assert_eq!(json["tenants"][0]["tenant"], "u1");
    assert_eq!(json["tenants"][0]["count"], 1);
    assert_eq!(json["tenants"][0]["inFlight"], 0);
    assert!(json["tenants"][0]["resetInMs"].as_u64().unwrap() <= 60_000);
}

#[tokio::test(start_paused = true)]
async fn builder_rejects_invalid_config() {
    let res = Governor::<()>::builder(GovernorConfig {
        window: Duration::ZERO,
        ..GovernorConfig::default()
    })
    .build();
    assert!(res.is_err());
}

#[derive(Default)]
struct Kinds(Mutex<Vec<EventKind>>);

#[async_trait]
impl Subscribe for Kinds {
    async fn on_event(&self, ev: &Event) {
        self.0.lock().unwrap().push(ev.kind);
    }
    fn name(&self) -> &'static str {
        "kinds"
    }
}

#[tokio::test(start_paused = true)]
async fn subscribers_receive_lifecycle_events() {
    let kinds = Arc::new(Kinds::default());
    let gov = Governor::builder(cfg())
        .with_subscriber(kinds.clone())
        .build()
        .unwrap();
    let log = Log::default();

    gov.submit("u1", None, record(&log, "a")).await.unwrap();
    for _ in 0..100 {
        if kinds.0.lock().unwrap().contains(&EventKind::DispatcherIdle) {
            break;
        }
        time::sleep(Duration::from_millis(10)).await;
    }

    let seen = kinds.0.lock().unwrap().clone();
    for kind in [
        EventKind::Admitted,
        EventKind::Enqueued,
        EventKind::DispatcherStarted,
        EventKind::Dispatched,
        EventKind::Completed,
        EventKind::DispatcherIdle,
    ] {
        assert!(seen.contains(&kind), "missing {kind:?} in {seen:?}");
    }
    gov.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_submissions_never_overdraw_the_budget() {
    const CAP: u32 = 10;
    const CALLERS: usize = 64;

    let gov = Governor::new(GovernorConfig {
        max_requests_per_window: CAP,
        min_interval: Duration::ZERO,
        ..cfg()
    })
    .unwrap();
    let log = Log::default();
    let start = Arc::new(tokio::sync::Barrier::new(CALLERS));

    let mut handles = Vec::new();
    for _ in 0..CALLERS {
        let gov = gov.clone();
        let start = Arc::clone(&start);
        let op = record(&log, "x");
        handles.push(tokio::spawn(async move {
            start.wait().await;
            gov.submit("u1", None, op).await
        }));
    }

    let (mut ok, mut limited) = (0u32, 0u32);
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => ok += 1,
            Err(GovernorError::RateLimitExceeded { .. }) => limited += 1,
            Err(other) => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(ok, CAP);
    assert_eq!(limited, CALLERS as u32 - CAP);
    assert_eq!(names(&log).len(), CAP as usize);
    assert_eq!(gov.stats().tenants[0].count, CAP);
    gov.shutdown();
}
