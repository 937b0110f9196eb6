//! Per-GPU Prometheus collector backed by `nvidia-smi` queries.

use crate::query::{parse_reading, query_args, GpuField};
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Gauge, Opts};
use serde::Serialize;
use smi_exporter_core::{CommandRunner, ExporterConfig, ExporterError, MissingValue};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Label carrying the device index.
pub const LABEL_GPU_SEQ: &str = "gpu_seq";

/// Label carrying the device product name.
pub const LABEL_NAME: &str = "name";

/// Static schema of one published gauge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuMetric {
    /// Fully qualified metric name
    pub name: &'static str,
    /// Help text
    pub help: &'static str,
    /// Field queried to obtain the value
    pub field: GpuField,
}

/// Gauges published for every GPU, in collection order.
pub static BASE_METRICS: [GpuMetric; 5] = [
    GpuMetric {
        name: "gpu_temperature",
        help: "GPU core temperature (degrees Celsius)",
        field: GpuField::Temperature,
    },
    GpuMetric {
        name: "gpu_memory_used",
        help: "GPU memory used (MiB)",
        field: GpuField::MemoryUsed,
    },
    GpuMetric {
        name: "gpu_memory_free",
        help: "GPU memory free (MiB)",
        field: GpuField::MemoryFree,
    },
    GpuMetric {
        name: "gpu_memory_total",
        help: "GPU memory total (MiB)",
        field: GpuField::MemoryTotal,
    },
    GpuMetric {
        name: "gpu_utilization",
        help: "GPU utilization (%)",
        field: GpuField::Utilization,
    },
];

/// Gauges added when extended metrics are enabled.
pub static EXTENDED_METRICS: [GpuMetric; 2] = [
    GpuMetric {
        name: "gpu_fan_speed",
        help: "GPU fan speed (% of maximum)",
        field: GpuField::FanSpeed,
    },
    GpuMetric {
        name: "gpu_power_draw",
        help: "GPU board power draw (W)",
        field: GpuField::PowerDraw,
    },
];

/// Settings shared by every collector of one exporter.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorOptions {
    /// `nvidia-smi` binary to invoke
    pub program: String,
    /// Publish [`EXTENDED_METRICS`] as well
    pub extended_metrics: bool,
    /// What to publish for a failed reading
    pub missing_value: MissingValue,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self::from_config(&ExporterConfig::default())
    }
}

impl CollectorOptions {
    /// Take the collection-related settings from an exporter config.
    #[must_use]
    pub fn from_config(config: &ExporterConfig) -> Self {
        Self {
            program: config.nvidia_smi.clone(),
            extended_metrics: config.extended_metrics,
            missing_value: config.missing_value,
        }
    }

    /// The metrics a collector built with these options publishes.
    pub fn metrics(&self) -> impl Iterator<Item = &'static GpuMetric> {
        let extended: &'static [GpuMetric] = if self.extended_metrics {
            &EXTENDED_METRICS
        } else {
            &[]
        };
        BASE_METRICS.iter().chain(extended)
    }
}

/// One metric's outcome from a single collection pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    /// Metric name
    pub metric: &'static str,
    /// Parsed value, `None` when the query or parse failed
    pub value: Option<f64>,
}

/// Raw readings of one GPU, as printed by `--once --format json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpuSnapshot {
    /// Device index
    pub gpu_seq: u32,
    /// Device product name
    pub name: String,
    /// Readings in collection order
    pub readings: Vec<Reading>,
}

struct GpuGauge {
    metric: &'static GpuMetric,
    opts: Opts,
    desc: Desc,
}

/// Collector publishing the gauges of a single GPU.
///
/// Descriptors are built once in [`GpuInfoCollector::new`]. Every call to
/// [`Collector::collect`] queries `nvidia-smi` afresh, one field at a time;
/// nothing is cached between passes.
pub struct GpuInfoCollector {
    runner: Arc<dyn CommandRunner>,
    options: CollectorOptions,
    index: u32,
    name: String,
    labels: HashMap<String, String>,
    gauges: Vec<GpuGauge>,
}

impl fmt::Debug for GpuInfoCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuInfoCollector")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl GpuInfoCollector {
    /// Create a collector for the GPU at `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if a descriptor cannot be built, e.g. because the
    /// device name is not valid label content.
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        index: u32,
        name: impl Into<String>,
        options: CollectorOptions,
    ) -> Result<Self, ExporterError> {
        let name = name.into();
        let labels = HashMap::from([
            (LABEL_GPU_SEQ.to_owned(), index.to_string()),
            (LABEL_NAME.to_owned(), name.clone()),
        ]);

        let gauges = options
            .metrics()
            .map(|metric| {
                let opts = Opts::new(metric.name, metric.help).const_labels(labels.clone());
                let desc = Desc::new(
                    metric.name.to_owned(),
                    metric.help.to_owned(),
                    Vec::new(),
                    labels.clone(),
                )?;
                Ok::<_, ExporterError>(GpuGauge { metric, opts, desc })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            runner,
            options,
            index,
            name,
            labels,
            gauges,
        })
    }

    /// Device index.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Device product name as reported at discovery.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Constant labels attached to every gauge.
    #[must_use]
    pub fn labels(&self) -> &HashMap<String, String> {
        &self.labels
    }

    /// Query every metric once, in order, without applying the
    /// missing-value policy.
    pub fn read(&self) -> Vec<Reading> {
        self.gauges
            .iter()
            .map(|gauge| Reading {
                metric: gauge.metric.name,
                value: self.query(gauge.metric.field),
            })
            .collect()
    }

    /// Query every metric once and bundle the result with the device identity.
    pub fn snapshot(&self) -> GpuSnapshot {
        GpuSnapshot {
            gpu_seq: self.index,
            name: self.name.clone(),
            readings: self.read(),
        }
    }

    fn query(&self, field: GpuField) -> Option<f64> {
        let args = query_args(field, Some(self.index));
        // The runner logs its own failures.
        let output = self.runner.run(&self.options.program, &args).ok()?;

        let value = parse_reading(&output);
        if value.is_none() {
            debug!(gpu = self.index, %field, %output, "unparseable reading");
        }
        value
    }
}

impl Collector for GpuInfoCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.gauges.iter().map(|gauge| &gauge.desc).collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let mut families = Vec::with_capacity(self.gauges.len());

        for (gauge, reading) in self.gauges.iter().zip(self.read()) {
            let Some(value) = self.options.missing_value.resolve(reading.value) else {
                continue;
            };

            match Gauge::with_opts(gauge.opts.clone()) {
                Ok(sample) => {
                    sample.set(value);
                    families.extend(sample.collect());
                }
                Err(e) => warn!(
                    gpu = self.index,
                    metric = gauge.metric.name,
                    error = %e,
                    "failed to build sample"
                ),
            }
        }

        families
    }
}
