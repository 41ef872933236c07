//! # Manager Lifecycle
//!
//! Every manager in the SDK walks the same small state machine:
//!
//! ```text
//!   Uninitialized ──initialize──▶ Initialized ──start──▶ Running
//!         ▲                            │                   │
//!         │                            │                 stop
//!         └────────── shutdown ────────┴──── Stopped ◀─────┘
//! ```
//!
//! A failed transition parks the manager in `Error`, from which only
//! `initialize` (retry) or `shutdown` (reset) are accepted.
//!
//! [`Lifecycle`] is the embedded helper that enforces this, and
//! [`Manager`] is the trait the facade drives. Most managers only implement
//! `initialize` and `shutdown`; `start` and `stop` default to plain state
//! transitions.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Where a manager currently sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ManagerState {
    #[default]
    Uninitialized,
    Initialized,
    Running,
    Stopped,
    Error,
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ManagerState::Uninitialized => "uninitialized",
            ManagerState::Initialized => "initialized",
            ManagerState::Running => "running",
            ManagerState::Stopped => "stopped",
            ManagerState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Lifecycle guard failures, shared by every manager error type.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("{0} manager not initialized")]
    NotInitialized(&'static str),

    #[error("{0} manager already initialized")]
    AlreadyInitialized(&'static str),
}

/// Lock-guarded lifecycle state embedded in each manager.
#[derive(Debug)]
pub struct Lifecycle {
    name: &'static str,
    state: RwLock<ManagerState>,
}

impl Lifecycle {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: RwLock::new(ManagerState::Uninitialized),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> ManagerState {
        *self.state.read()
    }

    /// True once `initialize` succeeded and `shutdown` has not run since.
    pub fn is_initialized(&self) -> bool {
        matches!(
            self.state(),
            ManagerState::Initialized | ManagerState::Running | ManagerState::Stopped
        )
    }

    pub fn is_running(&self) -> bool {
        self.state() == ManagerState::Running
    }

    /// Guard used at the top of every manager operation.
    pub fn ensure_ready(&self) -> Result<(), LifecycleError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(LifecycleError::NotInitialized(self.name))
        }
    }

    /// Move `Uninitialized | Error → Initialized`.
    pub fn initialize(&self) -> Result<(), LifecycleError> {
        let mut state = self.state.write();
        match *state {
            ManagerState::Uninitialized | ManagerState::Error => {
                *state = ManagerState::Initialized;
                Ok(())
            }
            _ => Err(LifecycleError::AlreadyInitialized(self.name)),
        }
    }

    /// Move to `Running`. Starting a running manager is a no-op.
    pub fn start(&self) -> Result<(), LifecycleError> {
        let mut state = self.state.write();
        match *state {
            ManagerState::Initialized | ManagerState::Stopped | ManagerState::Running => {
                *state = ManagerState::Running;
                Ok(())
            }
            _ => Err(LifecycleError::NotInitialized(self.name)),
        }
    }

    /// Move `Running → Stopped`. Any other state is left untouched.
    pub fn stop(&self) {
        let mut state = self.state.write();
        if *state == ManagerState::Running {
            *state = ManagerState::Stopped;
        }
    }

    /// Park the manager in `Error` after a failed transition.
    pub fn fail(&self) {
        *self.state.write() = ManagerState::Error;
    }

    /// Back to `Uninitialized`; the manager may be initialized again.
    pub fn reset(&self) {
        *self.state.write() = ManagerState::Uninitialized;
    }
}

/// The lifecycle surface the SDK facade drives across all managers.
#[async_trait]
pub trait Manager: Send + Sync {
    type Error: std::error::Error + From<LifecycleError> + Send + Sync + 'static;

    fn lifecycle(&self) -> &Lifecycle;

    /// Prepare internal state. Fails if already initialized.
    fn initialize(&self) -> Result<(), Self::Error>;

    /// Drop all state and return to `Uninitialized`.
    fn shutdown(&self) -> Result<(), Self::Error>;

    fn name(&self) -> &'static str {
        self.lifecycle().name()
    }

    fn state(&self) -> ManagerState {
        self.lifecycle().state()
    }

    fn is_initialized(&self) -> bool {
        self.lifecycle().is_initialized()
    }

    async fn start(&self) -> Result<(), Self::Error> {
        self.lifecycle().start().map_err(Into::into)
    }

    async fn stop(&self) -> Result<(), Self::Error> {
        self.lifecycle().stop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_lifecycle_is_uninitialized() {
        let lc = Lifecycle::new("test");
        assert_eq!(lc.state(), ManagerState::Uninitialized);
        assert!(!lc.is_initialized());
        assert_eq!(
            lc.ensure_ready(),
            Err(LifecycleError::NotInitialized("test"))
        );
    }

    #[test]
    fn double_initialize_rejected() {
        let lc = Lifecycle::new("test");
        lc.initialize().unwrap();
        assert_eq!(
            lc.initialize(),
            Err(LifecycleError::AlreadyInitialized("test"))
        );
    }

    #[test]
    fn start_requires_initialize() {
        let lc = Lifecycle::new("test");
        assert!(lc.start().is_err());
        lc.initialize().unwrap();
        lc.start().unwrap();
        assert!(lc.is_running());
    }

    #[test]
    fn stop_is_idempotent() {
        let lc = Lifecycle::new("test");
        lc.stop();
        assert_eq!(lc.state(), ManagerState::Uninitialized);

        lc.initialize().unwrap();
        lc.start().unwrap();
        lc.stop();
        lc.stop();
        assert_eq!(lc.state(), ManagerState::Stopped);
        assert!(lc.ensure_ready().is_ok());
    }

    #[test]
    fn error_state_allows_retry() {
        let lc = Lifecycle::new("test");
        lc.fail();
        assert!(lc.ensure_ready().is_err());
        lc.initialize().unwrap();
        assert!(lc.is_initialized());
    }

    #[test]
    fn reset_allows_reinitialize() {
        let lc = Lifecycle::new("test");
        lc.initialize().unwrap();
        lc.reset();
        assert!(!lc.is_initialized());
        lc.initialize().unwrap();
    }
}
