//! Cross-cutting HTTP layers: security headers, request validation, rate limits
//! and client IP extraction.

pub mod ip;
pub mod rate_limit;
pub mod security_headers;
pub mod validation;

pub use rate_limit::EndpointRateLimiter;
