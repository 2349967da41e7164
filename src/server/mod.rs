//! HTTP server layer for Pixel Proxy.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │            GET|HEAD /<directives?>/<origin path>                │
//! │                                                                 │
//! │  ┌──────────────────────────┐  ┌─────────────────────────────┐  │
//! │  │        handlers          │  │           routes            │  │
//! │  │ (method filter, errors)  │  │  (fallback, CORS, tracing)  │  │
//! │  └──────────────────────────┘  └─────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    image_handler, method_not_allowed, request_url, AppState, ErrorResponse,
    METHOD_NOT_ALLOWED_MESSAGE,
};
pub use routes::{create_router, RouterConfig};
