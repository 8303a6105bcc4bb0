//! Command Handling Module
//!
//! ```text
//! Command (from queue)
//!       │
//!       ▼
//! ┌─────────────────┐
//! │   Dispatcher    │  (dispatcher module)
//! │  - serialize    │
//! │  - route        │
//! │  - normalize    │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandlers │  (handler module, SocialGraph)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │    Registry     │  (registry module)
//! └─────────────────┘
//! ```

pub mod dispatcher;
pub mod handler;

pub use dispatcher::Dispatcher;
pub use handler::{CommandHandlers, HandlerError, HandlerResult, SocialGraph};
