//! Shared test utilities for Snapguard
//!
//! This module provides common helpers for integration tests:
//! - Scratch deployment trees with a realistic layout
//! - Git fixtures for deployments under revision control

pub mod deployment;
pub mod git_fixtures;
