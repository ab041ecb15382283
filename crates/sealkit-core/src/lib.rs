pub mod bundle;
pub mod config;
pub mod error;

pub use bundle::{BundleFile, MemoryBundle, StateBundle};
pub use error::{SealkitError, SealkitResult};
