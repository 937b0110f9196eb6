//! `nvidia-smi` query vocabulary and output parsing.

use std::fmt;

/// Output format flags shared by every single-field query.
pub const FORMAT_ARG: &str = "--format=csv,noheader,nounits";

/// A field understood by `nvidia-smi --query-gpu`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuField {
    /// Product name
    Name,
    /// Number of GPUs in the system, repeated on every line
    Count,
    /// Core temperature in degrees Celsius
    Temperature,
    /// Memory in use, MiB
    MemoryUsed,
    /// Free memory, MiB
    MemoryFree,
    /// Total installed memory, MiB
    MemoryTotal,
    /// GPU utilization, percent
    Utilization,
    /// Fan speed as percent of maximum
    FanSpeed,
    /// Board power draw, watts
    PowerDraw,
}

impl GpuField {
    /// The field name as `nvidia-smi` spells it.
    #[must_use]
    pub const fn as_query(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Count => "count",
            Self::Temperature => "temperature.gpu",
            Self::MemoryUsed => "memory.used",
            Self::MemoryFree => "memory.free",
            Self::MemoryTotal => "memory.total",
            Self::Utilization => "utilization.gpu",
            Self::FanSpeed => "fan.speed",
            Self::PowerDraw => "power.draw",
        }
    }
}

impl fmt::Display for GpuField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_query())
    }
}

/// Build the argument list for a single-field query.
///
/// With `index` set the query is restricted to that device via `-i`.
///
/// # Examples
///
/// ```rust
/// use smi_exporter_nvidia_gpu::query::{query_args, GpuField};
///
/// let args = query_args(GpuField::Temperature, Some(3));
/// assert_eq!(args.join(" "), "--query-gpu=temperature.gpu --format=csv,noheader,nounits -i 3");
/// ```
#[must_use]
pub fn query_args(field: GpuField, index: Option<u32>) -> Vec<String> {
    let mut args = vec![
        format!("--query-gpu={}", field.as_query()),
        FORMAT_ARG.to_owned(),
    ];
    if let Some(index) = index {
        args.push("-i".to_owned());
        args.push(index.to_string());
    }
    args
}

/// Parse a single numeric reading.
///
/// `nvidia-smi` prints `[N/A]` or `[Not Supported]` for fields a board does
/// not expose; those, blanks and anything else non-numeric yield `None`.
#[must_use]
pub fn parse_reading(output: &str) -> Option<f64> {
    let value = output.trim().parse::<f64>().ok()?;
    value.is_finite().then_some(value)
}

/// Parse the output of a `count` query.
///
/// The count is printed once per device, so only the first line matters.
#[must_use]
pub fn parse_count(output: &str) -> Option<u32> {
    output.lines().next()?.trim().parse().ok()
}
