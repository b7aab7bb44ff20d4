//! # swarm-breaker
//!
//! Resilient orchestration of unreliable remote AI providers.
//!
//! Every remote dependency (text generation, image generation and the
//! asynchronous worker queue) sits behind a named [`CircuitBreaker`]. The
//! [`SwarmAdapter`] routes each chat message either to a specialized worker
//! through the queue or to the text provider, and degrades to the local
//! [`JoualBee`] responder when the provider is down, so callers always get
//! an answer.
//!
//! ## Circuit states
//!
//! - **Closed**: healthy. Calls pass through to the remote dependency.
//! - **Open**: failing. Calls go straight to the fallback, or are rejected.
//! - **Half-Open**: once the reset timeout has elapsed, calls probe the
//!   dependency. Enough consecutive successes close the circuit; a single
//!   failure reopens it.
//!
//! ## Basic Usage
//!
//! ```rust
//! use std::time::Duration;
//! use swarm_breaker::{BreakerError, CircuitBreaker};
//!
//! # tokio_test::block_on(async {
//! let breaker = CircuitBreaker::builder("text-generation")
//!     .failure_threshold(3)
//!     .timeout(Duration::from_secs(8))
//!     .reset_timeout(Duration::from_secs(30))
//!     .build();
//!
//! let answer = breaker
//!     .call_with_fallback(
//!         || async { Err::<String, _>("provider down".to_string()) },
//!         || async { Ok("local answer".to_string()) },
//!     )
//!     .await;
//! assert_eq!(answer.unwrap(), "local answer");
//!
//! match breaker.call(|| async { Ok::<_, String>(42) }).await {
//!     Ok(value) => assert_eq!(value, 42),
//!     Err(BreakerError::Open { breaker }) => println!("{breaker} is open"),
//!     Err(err) => println!("call failed: {err}"),
//! }
//! # });
//! ```
//!
//! ## Features
//!
//! - `prometheus` - export breaker events through `prometheus-client`

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod breaker;
mod config;
mod error;
mod hook;
pub mod intent;
pub mod joual;
mod metrics;
mod policy;
pub mod prelude;
pub mod provider;
pub mod queue;
mod registry;
mod state;
pub mod swarm;
pub mod telemetry;

// Re-exports
pub use breaker::CircuitBreaker;
pub use config::{BreakerBuilder, BreakerConfig, BreakerOverrides, BreakerSettings, Dependency, SwarmConfig};
pub use error::{BreakerError, BreakerResult, ConfigError, SwarmError};
pub use hook::{FallbackReason, HookRegistry, Transition};
pub use intent::{BeeKind, IntentClassifier, IntentRule};
pub use joual::{JoualBee, LocalResponder, LocalResponse, Tone};
#[cfg(feature = "prometheus")]
pub use metrics::PrometheusSink;
pub use metrics::{BreakerMetrics, MetricSink, NullMetricSink};
pub use policy::{CountPolicy, CycleCounters, RatePolicy, TripPolicy, OUTCOME_WINDOW};
pub use provider::{ChatMessage, GeneratedImage, ImageGenerator, ProviderError, Role, TextGenerator};
pub use queue::{InMemoryTaskQueue, SwarmTask, TaskId, TaskQueue, TaskStatus, TaskSubscription, TaskUpdate};
pub use registry::{BreakerRegistry, CircuitHealth, SwarmHealth};
pub use state::{State, StateChange};
pub use swarm::{ImageRequest, ImageResult, SwarmAdapter, SwarmProgress, SwarmResponse};
