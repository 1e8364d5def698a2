//! Hydration state machine for entities with a deferred payload.
//!
//! ```text
//!  Ghost --enqueue--> InQueue --start_loading--> Loading --complete--> Ready
//!                        |                          |
//!                        +-----------fail-----------+--------------> Failed
//!  Ghost --mark_ready--> Ready
//!  (any) --reset--> Ghost
//! ```
//!
//! `Ready` and `Failed` are terminal until an explicit [`LazyStatus::reset`].
//! Consumers must not read an entity's payload unless the status is `Ready`.
//!
//! The status is interior-mutable so it can live inside an entity shared
//! through `Arc`.

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Observable hydration state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LazyState {
    /// Constructed, payload not loaded.
    Ghost,
    /// Hydration requested, not started.
    InQueue,
    /// Hydration in flight.
    Loading,
    /// Payload usable.
    Ready,
    /// Hydration failed with the given reason.
    Failed(String),
}

impl LazyState {
    fn label(&self) -> &'static str {
        match self {
            LazyState::Ghost => "Ghost",
            LazyState::InQueue => "InQueue",
            LazyState::Loading => "Loading",
            LazyState::Ready => "Ready",
            LazyState::Failed(_) => "Failed",
        }
    }
}

impl fmt::Display for LazyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LazyState::Failed(reason) => write!(f, "Failed({reason})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Thread-safe owner of one entity's [`LazyState`].
pub struct LazyStatus {
    state: Mutex<LazyState>,
}

impl LazyStatus {
    /// A status starting as [`LazyState::Ghost`].
    pub fn ghost() -> Self {
        Self {
            state: Mutex::new(LazyState::Ghost),
        }
    }

    /// A status starting as [`LazyState::Ready`], for entities built with
    /// their payload already present.
    pub fn ready() -> Self {
        Self {
            state: Mutex::new(LazyState::Ready),
        }
    }

    /// Snapshot of the current state.
    pub fn current(&self) -> LazyState {
        self.state.lock().clone()
    }

    pub fn is_ghost(&self) -> bool {
        matches!(*self.state.lock(), LazyState::Ghost)
    }

    pub fn is_in_queue(&self) -> bool {
        matches!(*self.state.lock(), LazyState::InQueue)
    }

    pub fn is_loading(&self) -> bool {
        matches!(*self.state.lock(), LazyState::Loading)
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.state.lock(), LazyState::Ready)
    }

    pub fn is_failed(&self) -> bool {
        matches!(*self.state.lock(), LazyState::Failed(_))
    }

    /// `Ghost → InQueue`.
    pub fn enqueue(&self) -> Result<(), CoreError> {
        self.transition(LazyState::InQueue, |s| matches!(s, LazyState::Ghost))
    }

    /// `InQueue → Loading`.
    pub fn start_loading(&self) -> Result<(), CoreError> {
        self.transition(LazyState::Loading, |s| matches!(s, LazyState::InQueue))
    }

    /// `Loading → Ready`.
    pub fn complete(&self) -> Result<(), CoreError> {
        self.transition(LazyState::Ready, |s| matches!(s, LazyState::Loading))
    }

    /// `Ghost → Ready`, for payloads supplied at construction.
    pub fn mark_ready(&self) -> Result<(), CoreError> {
        self.transition(LazyState::Ready, |s| matches!(s, LazyState::Ghost))
    }

    /// `InQueue | Loading → Failed(reason)`.
    pub fn fail(&self, reason: impl Into<String>) -> Result<(), CoreError> {
        self.transition(LazyState::Failed(reason.into()), |s| {
            matches!(s, LazyState::InQueue | LazyState::Loading)
        })
    }

    /// Unconditionally return to `Ghost`. The only way out of `Ready`/`Failed`.
    pub fn reset(&self) {
        *self.state.lock() = LazyState::Ghost;
    }

    fn transition(
        &self,
        to: LazyState,
        allowed_from: impl FnOnce(&LazyState) -> bool,
    ) -> Result<(), CoreError> {
        let mut state = self.state.lock();
        if !allowed_from(&state) {
            return Err(CoreError::InvalidTransition {
                from: state.label(),
                to: to.label(),
            });
        }
        *state = to;
        Ok(())
    }
}

impl Default for LazyStatus {
    fn default() -> Self {
        Self::ghost()
    }
}

impl fmt::Debug for LazyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LazyStatus({})", self.current())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_reaches_ready() {
        let status = LazyStatus::ghost();
        assert!(status.is_ghost());
        status.enqueue().unwrap();
        assert!(status.is_in_queue());
        status.start_loading().unwrap();
        assert!(status.is_loading());
        status.complete().unwrap();
        assert!(status.is_ready());
    }

    #[test]
    fn failure_is_terminal_until_reset() {
        let status = LazyStatus::ghost();
        status.enqueue().unwrap();
        status.start_loading().unwrap();
        status.fail("disk error").unwrap();
        assert_eq!(status.current(), LazyState::Failed("disk error".to_owned()));

        assert!(status.complete().is_err());
        assert!(status.mark_ready().is_err());
        assert!(status.enqueue().is_err());
        assert!(status.is_failed());

        status.reset();
        assert!(status.is_ghost());
        status.mark_ready().unwrap();
        assert!(status.is_ready());
    }

    #[test]
    fn cannot_enqueue_twice() {
        let status = LazyStatus::ghost();
        status.enqueue().unwrap();
        match status.enqueue() {
            Err(CoreError::InvalidTransition { from, to }) => {
                assert_eq!(from, "InQueue");
                assert_eq!(to, "InQueue");
            }
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
    }

    #[test]
    fn ghost_cannot_skip_to_loading() {
        let status = LazyStatus::ghost();
        assert!(status.start_loading().is_err());
        assert!(status.complete().is_err());
        assert!(status.fail("nope").is_err());
        assert!(status.is_ghost());
    }

    #[test]
    fn ready_constructor() {
        let status = LazyStatus::ready();
        assert!(status.is_ready());
        assert_eq!(format!("{status:?}"), "LazyStatus(Ready)");
    }
}
