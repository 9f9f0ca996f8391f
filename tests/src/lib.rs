//! # Switchboard Test Suite
//!
//! Unified test crate containing cross-component flows that exercise the
//! dispatch engine, transport, and client together.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── dispatch_flows.rs        # Request/reply flows and failure surfacing
//!     ├── sequential_streams.rs    # Sequential reply streams
//!     └── connection_lifecycle.rs  # Teardown and per-connection identity
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p switchboard-tests
//!
//! # By category
//! cargo test -p switchboard-tests integration::dispatch_flows::
//! cargo test -p switchboard-tests integration::sequential_streams::
//! ```

#![allow(unused_imports)]
#![allow(dead_code)]

pub mod integration;
