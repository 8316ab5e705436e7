//! ClearQuote: natural-language questions answered from a PostgreSQL
//! database, with every generated statement validated before it runs.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod reason;
pub mod schema;
pub mod validator;

pub use error::{ClearQuoteError, Result};
pub use reason::ReasonCode;
