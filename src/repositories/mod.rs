pub mod allowlist;
pub mod metrics;
