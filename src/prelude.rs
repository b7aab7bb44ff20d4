//! Re-exports the types needed to wire up a swarm adapter.
//!
//! # Example
//! ```rust,no_run
//! use swarm_breaker::prelude::*;
//! ```

pub use crate::breaker::CircuitBreaker;
pub use crate::config::{BreakerConfig, Dependency, SwarmConfig};
pub use crate::error::{BreakerError, BreakerResult, SwarmError};
pub use crate::intent::BeeKind;
pub use crate::joual::{JoualBee, LocalResponder, Tone};
pub use crate::provider::{ChatMessage, GeneratedImage, ImageGenerator, ProviderError, TextGenerator};
pub use crate::queue::{SwarmTask, TaskId, TaskQueue, TaskStatus, TaskSubscription, TaskUpdate};
pub use crate::registry::{BreakerRegistry, SwarmHealth};
pub use crate::state::State;
pub use crate::swarm::{ImageRequest, ImageResult, SwarmAdapter, SwarmProgress, SwarmResponse};
