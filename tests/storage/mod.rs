//! Shared storage integration tests.
//!
//! Tests the SubscriptionStore interface against all implementations.
//! Each implementation module imports these test functions and runs them.

pub mod subscription_store_tests;
