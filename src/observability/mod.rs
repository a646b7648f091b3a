// Observability: metrics and the Prometheus recorder.

pub mod metrics;

pub use metrics::init;
