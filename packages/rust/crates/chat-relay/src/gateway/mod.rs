//! Gateway namespace: HTTP and stdio entrypoints.

mod http;
mod stdio;
mod webhook;

pub use http::{
    ChatResponse, GatewayHealthResponse, GatewayState, authorize_request, router, run_http,
};
pub use stdio::run_stdio;
pub use webhook::{CAL_SIGNATURE_HEADER, verify_signature};
