//! Hash collections keyed by ids and raw handles.
//!
//! Identity maps and id pools are looked up on every native callback, so
//! they use AHash instead of SipHash.

pub use ahash::{AHashMap as HashMap, AHashSet as HashSet};
