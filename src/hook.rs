//! Hook registry for circuit breaker events.

use crate::state::State;
use parking_lot::RwLock;
use std::sync::Arc;

/// A state transition, as seen by hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition<'a> {
    /// Name of the breaker that changed state.
    pub breaker: &'a str,
    /// State before the transition.
    pub from: State,
    /// State after the transition.
    pub to: State,
}

/// Why a breaker served a call from its fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// The circuit was open and not yet eligible for a probe.
    CircuitOpen,
    /// The primary call exceeded its timeout.
    Timeout,
    /// The primary call returned an error.
    PrimaryFailed,
}

type TransitionHook = Arc<dyn Fn(&Transition<'_>) + Send + Sync + 'static>;
type FallbackHook = Arc<dyn Fn(&str, FallbackReason) + Send + Sync + 'static>;

/// A registry for circuit breaker event hooks.
pub struct HookRegistry {
    on_open: RwLock<Option<TransitionHook>>,
    on_close: RwLock<Option<TransitionHook>>,
    on_half_open: RwLock<Option<TransitionHook>>,
    on_fallback: RwLock<Option<FallbackHook>>,
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HookRegistry {
    /// Creates a new empty hook registry.
    pub fn new() -> Self {
        Self {
            on_open: RwLock::new(None),
            on_close: RwLock::new(None),
            on_half_open: RwLock::new(None),
            on_fallback: RwLock::new(None),
        }
    }

    /// Sets the hook to call when the circuit breaker opens.
    pub fn set_on_open<F>(&self, f: F)
    where
        F: Fn(&Transition<'_>) + Send + Sync + 'static,
    {
        *self.on_open.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when the circuit breaker closes.
    pub fn set_on_close<F>(&self, f: F)
    where
        F: Fn(&Transition<'_>) + Send + Sync + 'static,
    {
        *self.on_close.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when the circuit breaker half-opens.
    pub fn set_on_half_open<F>(&self, f: F)
    where
        F: Fn(&Transition<'_>) + Send + Sync + 'static,
    {
        *self.on_half_open.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call whenever a fallback serves a call.
    pub fn set_on_fallback<F>(&self, f: F)
    where
        F: Fn(&str, FallbackReason) + Send + Sync + 'static,
    {
        *self.on_fallback.write() = Some(Arc::new(f));
    }

    /// Executes the hook registered for the transition's target state.
    pub fn execute_transition_hook(&self, transition: &Transition<'_>) {
        let slot = match transition.to {
            State::Open => &self.on_open,
            State::Closed => &self.on_close,
            State::HalfOpen => &self.on_half_open,
        };
        // Clone out of the lock so a hook may re-register hooks.
        let hook = slot.read().clone();
        if let Some(hook) = hook {
            hook(transition);
        }
    }

    /// Executes the fallback hook.
    pub fn execute_fallback_hook(&self, breaker: &str, reason: FallbackReason) {
        let hook = self.on_fallback.read().clone();
        if let Some(hook) = hook {
            hook(breaker, reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn transition_hooks_fire_by_target_state() {
        let hooks = HookRegistry::new();
        let opened = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&opened);
        hooks.set_on_open(move |t| {
            assert_eq!(t.breaker, "text-generation");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        hooks.execute_transition_hook(&Transition {
            breaker: "text-generation",
            from: State::Closed,
            to: State::Open,
        });
        hooks.execute_transition_hook(&Transition {
            breaker: "text-generation",
            from: State::Open,
            to: State::HalfOpen,
        });

        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }
}
