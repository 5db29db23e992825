use std::marker::PhantomData;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    core::{
        admission::{AdmissionController, AdmissionLimits},
        config::GovernorConfig,
        dispatcher::Shared,
        governor::Governor,
    },
    error::ConfigError,
    events::Bus,
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for constructing a [`Governor`] with optional subscribers.
pub struct GovernorBuilder<T> {
    cfg: GovernorConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    _value: PhantomData<fn() -> T>,
}

impl<T: Send + 'static> GovernorBuilder<T> {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: GovernorConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            _value: PhantomData,
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive governor events (admission, dispatch, retries,
    /// outcomes) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Adds one subscriber.
    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Validates the configuration and builds the governor.
    ///
    /// Initializes the event bus, the tenant admission controller and, when
    /// subscribers were given, their workers plus the listener forwarding bus
    /// events to them. With subscribers this must run inside a tokio runtime.
    pub fn build(self) -> Result<Governor<T>, ConfigError> {
        self.cfg.validate()?;

        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let token = CancellationToken::new();
        let admission = AdmissionController::new(AdmissionLimits::from(&self.cfg), Instant::now());

        if !self.subscribers.is_empty() {
            let set = SubscriberSet::new(self.subscribers, bus.clone());
            spawn_listener(&bus, set, token.clone());
        }

        let shared = Shared::new(self.cfg, bus, admission, token);
        Ok(Governor::from_shared(Arc::new(shared)))
    }
}

/// Forwards bus events to `set` until the governor shuts down.
///
/// Events already on the bus when shutdown is signalled are still delivered.
fn spawn_listener(bus: &Bus, set: SubscriberSet, token: CancellationToken) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                msg = rx.recv() => match msg {
                    Ok(ev) => set.emit(&ev),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(target: "reqvisor", skipped, "subscriber listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = token.cancelled() => break,
            }
        }
        set.shutdown().await;
    });
}
