//! Persistence stores for the moderation engine
//!
//! Each store is a set of free functions over a pool or transaction, in the
//! same shape as the rest of the pubfig database layer. Multi-write
//! operations either manage their own transaction or take one from the
//! caller (the `_tx` variants) so the engine can compose them atomically.

pub mod audit;
pub mod authors;
pub mod evidence;
pub mod persons;
pub mod revisions;
pub mod votes;
