//! Unit tests for individual components

mod admin_test;
mod audit_test;
mod builders_test;
mod config_test;
mod error_test;
mod outbox_test;
mod util_test;
