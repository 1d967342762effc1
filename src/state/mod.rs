//! Persistent sentinel state.
//!
//! # Data Flow
//! ```text
//! watch / unwatch requests → store.rs → watchlist.json
//! chain monitor tick        → store.rs → cursor.json
//! ```

pub mod store;
pub mod types;

pub use store::{StateStore, StoreError, StoreResult};
pub use types::{CursorState, WatchItem};
