//! NVIDIA GPU collectors for smi-exporter.
//!
//! Each discovered GPU gets its own [`GpuInfoCollector`], which implements
//! [`prometheus::core::Collector`] by running one `nvidia-smi` query per
//! metric on every scrape.
//!
//! # Examples
//!
//! ```rust,no_run
//! use prometheus::Registry;
//! use smi_exporter_core::SystemRunner;
//! use smi_exporter_nvidia_gpu::{discover, register_all, CollectorOptions};
//! use std::sync::Arc;
//!
//! let registry = Registry::new();
//! let collectors = discover(Arc::new(SystemRunner::new()), &CollectorOptions::default());
//! register_all(&registry, collectors)?;
//!
//! let text = smi_exporter_nvidia_gpu::server::encode_text(&registry.gather())?;
//! println!("{text}");
//! # Ok::<(), smi_exporter_core::ExporterError>(())
//! ```

pub mod collector;
pub mod discovery;
pub mod query;
pub mod server;

pub use collector::{
    CollectorOptions, GpuInfoCollector, GpuMetric, GpuSnapshot, Reading, BASE_METRICS,
    EXTENDED_METRICS,
};
pub use discovery::{discover, register_all};
pub use query::GpuField;
