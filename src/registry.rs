//! Process-wide set of named breakers, one per remote dependency.

use std::sync::Arc;

use serde::Serialize;

use crate::breaker::CircuitBreaker;
use crate::config::{Dependency, SwarmConfig};
use crate::hook::HookRegistry;
use crate::metrics::{BreakerMetrics, MetricSink, NullMetricSink};
use crate::state::State;

/// Owns the breakers for text generation, image generation and the task queue.
///
/// Build one at startup and hand clones to every component that issues
/// remote calls. Tests get a fresh registry each, so no state leaks between them.
#[derive(Clone, Debug)]
pub struct BreakerRegistry {
    text_generation: CircuitBreaker,
    image_generation: CircuitBreaker,
    task_queue: CircuitBreaker,
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::from_config(&SwarmConfig::default())
    }
}

impl BreakerRegistry {
    /// Builds the breakers from configuration with no metric export.
    pub fn from_config(config: &SwarmConfig) -> Self {
        Self::with_metric_sink(config, Arc::new(NullMetricSink))
    }

    /// Builds the breakers from configuration, publishing to a shared sink.
    pub fn with_metric_sink(config: &SwarmConfig, sink: Arc<dyn MetricSink>) -> Self {
        let build = |dependency: Dependency| {
            CircuitBreaker::builder(dependency.name())
                .config(config.breaker_config(dependency))
                .shared_metric_sink(Arc::clone(&sink))
                .build()
        };

        Self {
            text_generation: build(Dependency::TextGeneration),
            image_generation: build(Dependency::ImageGeneration),
            task_queue: build(Dependency::TaskQueue),
        }
    }

    /// Builds the breakers from configuration, running `hooks` for each of them.
    pub fn with_hooks(config: &SwarmConfig, hooks: impl Fn(Dependency) -> HookRegistry) -> Self {
        let build = |dependency: Dependency| {
            CircuitBreaker::builder(dependency.name())
                .config(config.breaker_config(dependency))
                .hooks(hooks(dependency))
                .build()
        };

        Self {
            text_generation: build(Dependency::TextGeneration),
            image_generation: build(Dependency::ImageGeneration),
            task_queue: build(Dependency::TaskQueue),
        }
    }

    /// Assembles a registry from prebuilt breakers.
    pub fn from_parts(
        text_generation: CircuitBreaker,
        image_generation: CircuitBreaker,
        task_queue: CircuitBreaker,
    ) -> Self {
        Self {
            text_generation,
            image_generation,
            task_queue,
        }
    }

    /// The breaker guarding `dependency`.
    pub fn get(&self, dependency: Dependency) -> &CircuitBreaker {
        match dependency {
            Dependency::TextGeneration => &self.text_generation,
            Dependency::ImageGeneration => &self.image_generation,
            Dependency::TaskQueue => &self.task_queue,
        }
    }

    /// Text-generation breaker.
    pub fn text_generation(&self) -> &CircuitBreaker {
        &self.text_generation
    }

    /// Image-generation breaker.
    pub fn image_generation(&self) -> &CircuitBreaker {
        &self.image_generation
    }

    /// Task-queue breaker.
    pub fn task_queue(&self) -> &CircuitBreaker {
        &self.task_queue
    }

    /// Per-dependency state and metrics, for dashboards.
    pub fn health(&self) -> SwarmHealth {
        SwarmHealth {
            text_generation: CircuitHealth::of(&self.text_generation),
            image_generation: CircuitHealth::of(&self.image_generation),
            task_queue: CircuitHealth::of(&self.task_queue),
        }
    }
}

/// Health of one circuit.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitHealth {
    /// Breaker name.
    pub name: String,
    /// Current state.
    pub state: State,
    /// `state == CLOSED`.
    pub healthy: bool,
    /// Lifetime metrics snapshot.
    pub metrics: BreakerMetrics,
}

impl CircuitHealth {
    fn of(breaker: &CircuitBreaker) -> Self {
        let state = breaker.state();
        Self {
            name: breaker.name().to_string(),
            state,
            healthy: state == State::Closed,
            metrics: breaker.metrics(),
        }
    }
}

/// Health of every circuit the swarm depends on.
#[derive(Debug, Clone, Serialize)]
pub struct SwarmHealth {
    /// Text generation circuit.
    pub text_generation: CircuitHealth,
    /// Image generation circuit.
    pub image_generation: CircuitHealth,
    /// Task queue circuit.
    pub task_queue: CircuitHealth,
}

impl SwarmHealth {
    /// Whether every circuit is closed.
    pub fn all_healthy(&self) -> bool {
        self.text_generation.healthy && self.image_generation.healthy && self.task_queue.healthy
    }
}
