//! Shared infrastructure for the API integration tests
//!
//! Builds the real router and services over an in-memory token store and a
//! manual clock. Realtime connections are either driven in-process or served
//! over a real listener.

#![allow(unused_imports)]

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
