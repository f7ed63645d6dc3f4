//! Wallet sign-in: nonces, challenge messages, signature recovery, and sessions.

pub mod message;
pub mod middleware;
pub mod nonce;
pub mod protocol;
pub mod session;
pub mod verify;

pub use middleware::{AppState, AuthSession};
pub use nonce::NonceStore;
pub use protocol::{AuthError, AuthProtocol, AuthSettings, VerifiedIdentity};
pub use session::SessionIssuer;
pub use verify::{PersonalMessageVerifier, SignatureVerifier};
