//! HTTP API served under `/api`

pub mod dto;
pub mod http;
pub mod routes;
pub mod state;

pub use http::{HttpRequest, HttpResponse};
pub use routes::{handle_request, respond, EXAMPLE_QUESTIONS};
pub use state::{AppState, LiveServices, ServiceBuilder, Services};
