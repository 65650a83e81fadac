//! Network layer: the API traits and their reqwest implementation.

pub mod api;

#[cfg(test)]
#[path = "mock_test.rs"]
pub mod mock;
