//! # Shared Types Crate
//!
//! This crate contains the voting entities shared by the lifecycle engine,
//! the change feed and every adapter.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All cross-crate types are defined here.
//! - **Typed Identity**: posts, comments and users are distinct newtypes over
//!   `Uuid`, so a comment id can never be passed where a post id is expected.
//! - **Provisional Identity**: optimistic votes carry `VoteId::Provisional`
//!   until the authoritative store returns a confirmed id.

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;
