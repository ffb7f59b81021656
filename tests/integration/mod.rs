//! Integration tests for Snapguard
//!
//! These tests drive backup, verify and restore together against scratch
//! deployments and a mock process manager.

#[path = "../common/mod.rs"]
pub mod common;

pub mod backup_flow;
pub mod cli;
pub mod restore_flow;
pub mod verify_flow;
