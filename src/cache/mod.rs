//! Cache Module
//!
//! Bounded in-memory layer in front of a store, avoiding repeated
//! deserialization of hot objects.
//!
//! ## Eviction Order
//! ```text
//!  evicted first                                        evicted last
//!  ┌──────────────────────────────┬───────────────────────────────────┐
//!  │ newborns (never re-accessed) │ adults (re-accessed at least once)│
//!  │   oldest insertion first     │  lowest access count first,       │
//!  │                              │  then oldest insertion            │
//!  └──────────────────────────────┴───────────────────────────────────┘
//! ```

mod cached_store;
mod eviction;

pub use cached_store::CachedStore;
pub use eviction::EvictionCache;
