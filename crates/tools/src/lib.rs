//! Tool dispatch backends for Switchboard.
//!
//! The engine resolves handoffs itself and hands every other internal tool
//! call to a `ToolDispatcher`. This crate provides the dispatchers:
//! simulated mock tools, HMAC-signed webhook tools, and a router that picks
//! between them per tool.

pub mod mock;
pub mod router;
pub mod webhook;

pub use mock::MockToolDispatcher;
pub use router::ToolRouter;
pub use webhook::{WebhookToolDispatcher, sign, verify_signature};
