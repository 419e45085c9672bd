pub mod rest;
pub mod metrics;

pub use metrics::create_metrics_api;
pub use rest::{create_rest_api, ApiError};
