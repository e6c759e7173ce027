//! Integration tests module
//!
//! This module organizes all integration tests for the r-alertsound application.

pub mod scheduler_test;
