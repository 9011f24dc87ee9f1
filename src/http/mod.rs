// Outbound HTTP plumbing: timeouts on every client, rate limiting for the identity system

pub mod client;
mod test;

pub use client::{build_http_client, RateLimitedHttpClient};
