//! Table-format types: schemas, partitioning, data files and metadata.

mod data_file;
mod metadata;
mod partition;
mod schema;

pub use data_file::*;
pub use metadata::*;
pub use partition::*;
pub use schema::*;
