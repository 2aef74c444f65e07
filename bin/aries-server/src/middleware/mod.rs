//! HTTP middleware stack.
//!
//! - [`cors`]: the CORS layer, which also answers preflight requests.
//! - [`trace`]: per-request span, trace id and latency logging.

pub mod cors;
pub mod trace;
