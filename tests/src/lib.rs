//! # smsg Test Suite
//!
//! Scenario tests that drive the bus the way an application would.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── broadcast_flows.rs   # subscribe / publish / unsubscribe
//!     ├── call_flows.rs        # register / invoke / invoke_sync
//!     ├── module_lifecycle.rs  # modules announcing and serving calls
//!     ├── shared_instance.rs   # the process-wide bus
//!     └── telemetry_export.rs  # bus counters in the Prometheus registry
//!
//! tests/benches/
//! └── bus_benchmarks.rs        # criterion throughput benches
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p smsg-tests
//!
//! # One scenario group
//! cargo test -p smsg-tests integration::call_flows::
//!
//! # Benchmarks
//! cargo bench -p smsg-tests
//! ```

pub mod integration;
