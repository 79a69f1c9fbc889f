#![cfg_attr(
    feature = "cargo-clippy",
    warn(
        clippy::pedantic,
        missing_debug_implementations,
        trivial_casts,
        trivial_numeric_casts,
        unreachable_pub,
        variant_size_differences,
        missing_docs,
        rust_2018_idioms
    )
)]
#![cfg_attr(feature = "cargo-clippy", allow(clippy::module_name_repetitions))]

//! The reusable library powering `datagen`: a rule-driven synthetic test-data generator.

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod generator;
pub mod introspect;
pub mod model;
pub mod regexgen;
pub mod schema;
pub mod sinks;
pub mod store;
pub mod value;
