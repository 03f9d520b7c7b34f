//! Main integration test entry point for jelly-session
//!
//! This file serves as the entry point for all integration tests.

// Import the individual test modules
mod integration;
