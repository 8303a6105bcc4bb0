//! Client Registry Module
//!
//! Shared table of logged-in clients and the per-client session state.
//!
//! - `session`: [`ClientSession`], [`ClientKey`] and timeline entries
//! - `table`: the [`Registry`] itself (lookup / insert / remove)

pub mod session;
pub mod table;

pub use session::{ClientKey, ClientSession, TimelineEntry, DEFAULT_TIMELINE_CAPACITY};
pub use table::{Registry, RegistryError, DEFAULT_MAX_CLIENTS};
