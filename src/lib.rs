//! aeromodel - A strict, schema-validated document model layer
//!
//! One schema, two enforcement points: the parser validates and transforms
//! documents in process, and the compiled `$jsonSchema` validator re-checks
//! every write inside the storage engine.

pub mod context;
pub mod model;
pub mod modifier;
pub mod schema;
pub mod store;
