//! Operational Surface
//!
//! Health probes and Prometheus exposition for a running cache.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     TieredCache                          │
//! │   metrics() · circuit_breaker_state() · health_check()   │
//! └───────────────┬──────────────────────────┬───────────────┘
//!                 │                          │
//!       ┌─────────▼─────────┐      ┌─────────▼─────────┐
//!       │   HealthCheck     │      │ PrometheusExporter│
//!       │ /healthz /readyz  │      │ /metrics          │
//!       └───────────────────┘      └───────────────────┘
//! ```

mod exporter;
mod health;

pub use exporter::PrometheusExporter;
pub use health::{HealthCheck, HealthCheckResult, HealthResponse, HealthStatus};
