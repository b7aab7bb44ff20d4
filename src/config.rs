//! Configuration for circuit breakers and the swarm adapter.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::breaker::CircuitBreaker;
use crate::error::ConfigError;
use crate::hook::HookRegistry;
use crate::metrics::{MetricSink, NullMetricSink};
use crate::policy::{CountPolicy, TripPolicy};

/// Immutable per-breaker tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Failures counted in CLOSED before the circuit trips open.
    pub failure_threshold: u32,
    /// Consecutive HALF_OPEN successes needed to close the circuit.
    pub success_threshold: u32,
    /// Maximum wall-clock time for a single primary attempt.
    pub timeout: Duration,
    /// Minimum dwell time after the last transition before an OPEN circuit is probed.
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_millis(5_000),
            reset_timeout: Duration::from_millis(30_000),
        }
    }
}

impl BreakerConfig {
    /// Checks that every threshold and duration is usable.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.failure_threshold == 0 {
            errors.push("failure_threshold must be at least 1".to_string());
        }
        if self.success_threshold == 0 {
            errors.push("success_threshold must be at least 1".to_string());
        }
        if self.timeout.is_zero() {
            errors.push("timeout must be greater than zero".to_string());
        }
        if self.reset_timeout.is_zero() {
            errors.push("reset_timeout must be greater than zero".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// The remote dependencies the swarm talks to, one breaker each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dependency {
    /// Chat/text completion provider.
    TextGeneration,
    /// Image generation provider.
    ImageGeneration,
    /// Asynchronous worker task queue.
    TaskQueue,
}

impl Dependency {
    /// All dependencies, in dashboard order.
    pub const ALL: [Dependency; 3] = [
        Dependency::TextGeneration,
        Dependency::ImageGeneration,
        Dependency::TaskQueue,
    ];

    /// Breaker name for this dependency.
    pub fn name(self) -> &'static str {
        match self {
            Dependency::TextGeneration => "text-generation",
            Dependency::ImageGeneration => "image-generation",
            Dependency::TaskQueue => "task-queue",
        }
    }

    /// Default tunables for this dependency's breaker.
    pub fn default_config(self) -> BreakerConfig {
        let base = BreakerConfig::default();
        match self {
            Dependency::TextGeneration => BreakerConfig {
                failure_threshold: 3,
                timeout: Duration::from_millis(8_000),
                ..base
            },
            Dependency::ImageGeneration => BreakerConfig {
                failure_threshold: 5,
                timeout: Duration::from_millis(12_000),
                ..base
            },
            Dependency::TaskQueue => BreakerConfig {
                failure_threshold: 4,
                timeout: Duration::from_millis(6_000),
                ..base
            },
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Builder for creating circuit breakers with custom configurations.
pub struct BreakerBuilder {
    name: String,
    config: BreakerConfig,
    policy: Option<Arc<dyn TripPolicy>>,
    metric_sink: Arc<dyn MetricSink>,
    hook_registry: Arc<HookRegistry>,
}

impl BreakerBuilder {
    /// Creates a new builder with default settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: BreakerConfig::default(),
            policy: None,
            metric_sink: Arc::new(NullMetricSink),
            hook_registry: Arc::new(HookRegistry::new()),
        }
    }

    /// Replaces every tunable at once.
    pub fn config(mut self, config: BreakerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the number of failures that trips the circuit.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// Sets the number of consecutive half-open successes that closes the circuit.
    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    /// Sets the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Sets the dwell time before an open circuit is probed.
    pub fn reset_timeout(mut self, duration: Duration) -> Self {
        self.config.reset_timeout = duration;
        self
    }

    /// Sets a custom trip policy. Defaults to [`CountPolicy`].
    pub fn policy<P: TripPolicy>(mut self, policy: P) -> Self {
        self.policy = Some(Arc::new(policy));
        self
    }

    /// Sets a metric sink for the circuit breaker.
    pub fn metric_sink<M: MetricSink>(mut self, sink: M) -> Self {
        self.metric_sink = Arc::new(sink);
        self
    }

    /// Shares an existing metric sink between several breakers.
    pub fn shared_metric_sink(mut self, sink: Arc<dyn MetricSink>) -> Self {
        self.metric_sink = sink;
        self
    }

    /// Sets a hook registry for the circuit breaker.
    pub fn hooks(mut self, hooks: HookRegistry) -> Self {
        self.hook_registry = Arc::new(hooks);
        self
    }

    /// Builds the circuit breaker.
    pub fn build(self) -> CircuitBreaker {
        let policy = self.policy.unwrap_or_else(|| {
            Arc::new(CountPolicy::new(
                self.config.failure_threshold,
                self.config.success_threshold,
            ))
        });

        CircuitBreaker::new(
            self.name,
            self.config,
            policy,
            self.metric_sink,
            self.hook_registry,
        )
    }
}

/// Optional overrides for one dependency's breaker, in milliseconds.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BreakerSettings {
    /// Overrides [`BreakerConfig::failure_threshold`].
    pub failure_threshold: Option<u32>,
    /// Overrides [`BreakerConfig::success_threshold`].
    pub success_threshold: Option<u32>,
    /// Overrides [`BreakerConfig::timeout`].
    pub timeout_ms: Option<u64>,
    /// Overrides [`BreakerConfig::reset_timeout`].
    pub reset_timeout_ms: Option<u64>,
}

impl BreakerSettings {
    fn apply(&self, mut config: BreakerConfig) -> BreakerConfig {
        if let Some(v) = self.failure_threshold {
            config.failure_threshold = v;
        }
        if let Some(v) = self.success_threshold {
            config.success_threshold = v;
        }
        if let Some(ms) = self.timeout_ms {
            config.timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.reset_timeout_ms {
            config.reset_timeout = Duration::from_millis(ms);
        }
        config
    }
}

/// Per-dependency `[breakers.*]` tables.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BreakerOverrides {
    /// `[breakers.text_generation]`
    pub text_generation: BreakerSettings,
    /// `[breakers.image_generation]`
    pub image_generation: BreakerSettings,
    /// `[breakers.task_queue]`
    pub task_queue: BreakerSettings,
}

const DEFAULT_TASK_WAIT_MS: u64 = 120_000;

/// Top-level swarm configuration, usually read from a TOML file.
///
/// ```toml
/// task_wait_timeout_ms = 60000
/// local_seed = 7
///
/// [breakers.text_generation]
/// failure_threshold = 3
/// reset_timeout_ms = 10000
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SwarmConfig {
    /// Per-dependency breaker overrides.
    pub breakers: BreakerOverrides,
    /// How long to wait for a specialized task to finish. `0` waits forever.
    pub task_wait_timeout_ms: u64,
    /// Seed for the local fallback generator. Entropy-seeded when absent.
    pub local_seed: Option<u64>,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            breakers: BreakerOverrides::default(),
            task_wait_timeout_ms: DEFAULT_TASK_WAIT_MS,
            local_seed: None,
        }
    }
}

impl SwarmConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: SwarmConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Effective breaker tunables for `dependency`: defaults with overrides applied.
    pub fn breaker_config(&self, dependency: Dependency) -> BreakerConfig {
        let settings = match dependency {
            Dependency::TextGeneration => &self.breakers.text_generation,
            Dependency::ImageGeneration => &self.breakers.image_generation,
            Dependency::TaskQueue => &self.breakers.task_queue,
        };
        settings.apply(dependency.default_config())
    }

    /// Maximum wait for a specialized task, if bounded.
    pub fn task_wait_timeout(&self) -> Option<Duration> {
        match self.task_wait_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Validates every effective breaker configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let errors: Vec<String> = Dependency::ALL
            .iter()
            .filter_map(|dep| {
                self.breaker_config(*dep)
                    .validate()
                    .err()
                    .map(|errs| (dep, errs))
            })
            .flat_map(|(dep, errs)| errs.into_iter().map(move |e| format!("{}: {}", dep, e)))
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}
