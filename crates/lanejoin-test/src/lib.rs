//! # lanejoin-test
//!
//! Integration scenarios for lanejoin.
//!
//! This crate contains:
//! - Relation and program fixtures shared by the scenarios in `tests/`
//! - A brute-force reference join the executor output is checked against

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Relation, program and run fixtures.
pub mod fixtures;

/// Brute-force reference join.
pub mod reference;

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Installs a test subscriber honouring `RUST_LOG`, once per process.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
