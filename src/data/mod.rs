//! Tabular data handling: source loading, stage tables, schema checks.

pub mod frame;
pub mod loader;
pub mod schema;

pub use frame::{write_atomic, Frame};
pub use loader::load_records;
pub use schema::DataSchema;
