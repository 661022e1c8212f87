//! Small helpers shared by the credential vault and the module store.

pub mod id;
pub mod merge;

pub use id::{deserialize_id, generate_id};
pub use merge::{merge_by_id, Identified};
