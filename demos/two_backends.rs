//! # Example: two_backends
//!
//! Two governors in front of two simulated dependencies: an inference backend
//! that answers slowly and sometimes returns 503, and a mapping API with a
//! larger budget.
//!
//! Demonstrates how to:
//! - Build one [`Governor`] per dependency from the presets.
//! - Attach the built-in [`LogWriter`] and route it through `tracing-subscriber`.
//! - Observe retries, per-tenant rejections and the stats snapshot.
//!
//! ## Run
//! ```bash
//! RUST_LOG=reqvisor=debug cargo run --example two_backends
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use reqvisor::{
    BackoffPolicy, Governor, GovernorConfig, GovernorError, LogWriter, Operation, Subscribe,
    TenantId, UpstreamError,
};

/// Simulated inference call: every third call hits a 503.
fn inference_call(calls: Arc<AtomicU32>, prompt: &'static str) -> impl Operation<String> {
    move || {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            if n % 3 == 2 {
                Err(UpstreamError::with_status(503, "model overloaded"))
            } else {
                Ok(format!("summary of {prompt:?}"))
            }
        }
    }
}

/// Simulated distance lookup in meters.
async fn distance(from: &'static str, to: &'static str) -> Result<u32, UpstreamError> {
    tokio::time::sleep(Duration::from_millis(20)).await;
    Ok((from.len() as u32 + to.len() as u32) * 1_250)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("reqvisor=info")),
        )
        .init();

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];

    let inference: Governor<String> = Governor::builder(GovernorConfig {
        max_requests_per_window: 3,
        min_interval: Duration::from_millis(200),
        backoff: BackoffPolicy {
            first: Duration::from_millis(300),
            ..Default::default()
        },
        ..GovernorConfig::inference()
    })
    .with_subscribers(subs.clone())
    .build()?;

    let mapping: Governor<u32> = Governor::builder(GovernorConfig::mapping())
        .with_subscribers(subs)
        .build()?;

    let calls = Arc::new(AtomicU32::new(0));
    let mut jobs = Vec::new();
    for (tenant, prompt, priority) in [
        ("alice", "profile bio", 1),
        ("alice", "commute notes", 0),
        ("bob", "profile bio", 0),
        ("alice", "weekend plans", 2),
        ("alice", "one too many", 2),
    ] {
        let gov = inference.clone();
        let op = inference_call(Arc::clone(&calls), prompt);
        jobs.push(tokio::spawn(async move {
            (tenant, gov.execute(tenant, Some(priority), op).await)
        }));
    }

    let routes = [("home", "office"), ("home", "gym"), ("office", "station")];
    let mut lookups = Vec::new();
    for (from, to) in routes {
        let gov = mapping.clone();
        lookups.push(tokio::spawn(async move {
            gov.submit(TenantId::from("alice"), None, move || distance(from, to))
                .await
        }));
    }

    for job in jobs {
        let (tenant, res) = job.await?;
        match res {
            Ok(done) => println!(
                "[{tenant}] {} after {} attempt(s), {:?} in queue",
                done.value, done.attempts, done.queued_for
            ),
            Err(err @ GovernorError::RateLimitExceeded { .. }) => {
                println!("[{tenant}] rejected ({}): {err}", err.http_status())
            }
            Err(err) => println!("[{tenant}] failed [{}]: {err}", err.as_label()),
        }
    }
    for lookup in lookups {
        println!("[alice] distance: {}m", lookup.await??);
    }

    println!("inference stats: {:?}", inference.stats());
    println!("mapping stats:   {:?}", mapping.stats());

    inference.shutdown();
    mapping.shutdown();
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
