//! # Vote Lifecycle Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── support.rs        # Shared backend, per-client wiring, wait helpers
//! └── integration/      # Cross-crate flows
//!     ├── sync_flows.rs          # mutation + change feed + sync bridge
//!     └── notification_flows.rs  # dedup across clients, deadline watcher
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p vote-tests
//! cargo test -p vote-tests integration::sync_flows
//! ```

pub mod integration;
pub mod support;
