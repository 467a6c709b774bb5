//! Tiered agent memory
//!
//! ```text
//! output text
//!    │ classify (auto | discard | ask)
//!    ▼
//! ephemeral tier   process-local map, mirrors every mid-tier record
//! mid tier         redb table in the project directory, optional TTL
//! long tier        similarity index, only for promoted texts
//! ```

pub mod classifier;
mod ephemeral;
mod long_tier;
mod manager;

pub use classifier::{
    DEFAULT_PROMOTION_MIN_CHARS, StoreDecision, classify, extract_code_block, has_code_fence,
    should_promote,
};
pub use ephemeral::EphemeralStore;
pub use long_tier::{HttpVectorIndex, InMemoryIndex, LongTermHit, LongTermIndex};
pub use manager::{
    ForceOptions, MemoryManager, MemoryRecord, StoragePolicy, StoreMeta, StoreOutcome,
};
