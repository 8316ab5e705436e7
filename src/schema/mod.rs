//! Schema module: the table whitelist shared by the generator prompt and the validator

pub mod clear_quote;
pub mod context;

pub use context::{ColumnDescriptor, ForeignKey, SchemaContext, SchemaHandle, TableDescriptor};
