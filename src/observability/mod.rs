// src/observability/mod.rs
//! Observability: tracing setup, cache events and metrics
//!
//! - **Tracing**: [`init_tracing`] installs a `tracing-subscriber` pipeline
//!   filtered by `RUST_LOG` (falling back to the configured level)
//! - **Cache events**: [`CacheEvent`]s delivered to a [`CacheEventSink`]
//! - **Metrics**: counters recorded through the `metrics` facade

use crate::generation::emitter::ImplementationId;
use crate::utils::config::LoggingSettings;
use crate::utils::errors::{ProxyError, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Counter of shape cache hits
pub const CACHE_HITS: &str = "interpose_cache_hits_total";

/// Counter of implementations built
pub const CACHE_BUILDS: &str = "interpose_cache_builds_total";

/// Counter of calls routed through an interceptor chain
pub const INTERCEPTED_CALLS: &str = "interpose_intercepted_calls_total";

/// Install the global tracing subscriber
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(settings: &LoggingSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .map_err(|e| ProxyError::Observability(e.to_string()))?;

    let installed = if settings.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact().with_target(true))
            .try_init()
    };
    installed.map_err(|e| ProxyError::Observability(e.to_string()))?;

    info!("Tracing initialised (level: {}, json: {})", settings.level, settings.json);
    Ok(())
}

/// Outcome of one shape cache lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CacheEvent {
    /// An existing implementation was reused
    Hit {
        implementation: ImplementationId,
        name: String,
        shape: String,
        at: DateTime<Utc>,
    },

    /// A new implementation was generated
    Built {
        implementation: ImplementationId,
        name: String,
        shape: String,
        at: DateTime<Utc>,
    },
}

impl CacheEvent {
    pub fn implementation(&self) -> ImplementationId {
        match self {
            CacheEvent::Hit { implementation, .. } | CacheEvent::Built { implementation, .. } => {
                *implementation
            }
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, CacheEvent::Hit { .. })
    }
}

/// Receives cache events
pub trait CacheEventSink: Send + Sync {
    fn record(&self, event: &CacheEvent);
}

/// Reports cache events as tracing records
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl CacheEventSink for TracingSink {
    fn record(&self, event: &CacheEvent) {
        match event {
            CacheEvent::Hit { name, shape, .. } => debug!("Reusing {} for {}", name, shape),
            CacheEvent::Built { name, shape, .. } => info!("Built {} for {}", name, shape),
        }
    }
}

/// Discards cache events
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSink;

impl CacheEventSink for SilentSink {
    fn record(&self, _event: &CacheEvent) {}
}

/// Collects cache events in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<CacheEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CacheEvent> {
        self.events.lock().clone()
    }

    pub fn hits(&self) -> usize {
        self.events.lock().iter().filter(|e| e.is_hit()).count()
    }

    pub fn builds(&self) -> usize {
        self.events.lock().iter().filter(|e| !e.is_hit()).count()
    }

    /// Serialize collected events as JSON lines
    pub fn to_json_lines(&self) -> Result<String> {
        let mut out = String::new();
        for event in self.events.lock().iter() {
            out.push_str(&serde_json::to_string(event)?);
            out.push('\n');
        }
        Ok(out)
    }
}

impl CacheEventSink for MemorySink {
    fn record(&self, event: &CacheEvent) {
        self.events.lock().push(event.clone());
    }
}
