//! Authentication Hook — an optional, pluggable step run once per
//! session.
//!
//! The hook exists for future legitimate credentialed flows. The core
//! never invents credentials: if no hook is installed, or the
//! installed hook reports failure, reads proceed regardless and the
//! device's own status byte is authoritative. Do not add a "bypass"
//! implementation here — see the design notes in `SPEC_FULL.md`.

use async_trait::async_trait;

/// Outcome of running the authentication hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// The hook has not run yet this session.
    Unknown,
    NotAuthenticated,
    Authenticated,
}

/// A pluggable authentication strategy, installed with
/// `Engine::set_auth_strategy`.
///
/// Implementations may talk to an external credential store, prompt a
/// user, or simply return `NotAuthenticated`. The engine calls this at
/// most once per session, the first time `read_pages` is invoked.
#[async_trait]
pub trait AuthHook: Send + Sync {
    async fn authenticate(&self) -> AuthState;
}

/// The default hook: always reports `NotAuthenticated`. Reads still
/// proceed — the device's status byte is the source of truth.
pub struct NoAuth;

#[async_trait]
impl AuthHook for NoAuth {
    async fn authenticate(&self) -> AuthState {
        AuthState::NotAuthenticated
    }
}
