//! Shared test utilities for retro-usb-bridge tests
//!
//! Each integration test pulls in the helpers it needs; the rest would
//! otherwise warn as unused.

#![allow(dead_code)]

pub mod mock_hardware;

pub use mock_hardware::*;
