//! # Integration Scenarios
//!
//! Most scenarios use a private [`Bus`](smsg_bus::Bus) so they can run in
//! parallel. `shared_instance` uses the process-wide bus with topics no
//! other test touches.

pub mod module_lifecycle;
pub mod shared_instance;
