/// Middleware for the offerwatch server:
/// - request instrumentation (timing + response capture for API paths)
pub mod request_log;

pub use request_log::{access_log, format_access_line};
