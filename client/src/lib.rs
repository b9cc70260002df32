//! Client-side session and token lifecycle for the reviewdesk API.
//!
//! The pieces compose leaf-first: [`codec`] validates tokens without I/O,
//! [`error`] classifies failures into typed recovery decisions, [`refresh`]
//! owns deduplicated refresh attempts and scheduled expiry checks,
//! [`recovery`] throttles and executes recovery actions, and
//! [`controller`] glues them into one state holder per session context.
//! Everything is explicitly constructed and injected; there are no ambient
//! singletons.

pub mod api;
pub mod codec;
pub mod controller;
pub mod error;
pub mod recovery;
pub mod refresh;

pub use api::{ApiClient, CredentialStore, MemoryCredentialStore};
pub use controller::{AuthPhase, AuthSessionController, TokenState};
pub use error::{classify, classify_refresh_failure, AuthError, AuthErrorKind, RecoveryAction};
pub use recovery::{RecoveryDispatcher, RecoveryOutcome, SkipReason};
pub use refresh::{BackoffPolicy, RefreshEvent, RefreshOutcome, TokenRefreshManager};
