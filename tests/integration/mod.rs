//! Integration tests module
//!
//! This module organizes all integration tests for the jelly-session crate.

// Import individual test modules
pub mod config_test;
pub mod jellyfin_client_test;
pub mod queue_test;
pub mod session_test;
