//! Startup enumeration of NVIDIA GPUs.

use crate::collector::{CollectorOptions, GpuInfoCollector};
use crate::query::{parse_count, query_args, GpuField};
use prometheus::Registry;
use smi_exporter_core::{CommandRunner, ExporterError};
use std::sync::Arc;
use tracing::{info, warn};

/// Number of GPUs reported by `nvidia-smi`, zero when it cannot be
/// determined.
pub fn gpu_count(runner: &dyn CommandRunner, program: &str) -> u32 {
    let output = match runner.run(program, &query_args(GpuField::Count, None)) {
        Ok(output) => output,
        Err(e) => {
            warn!(error = %e, "GPU enumeration failed, assuming no GPUs");
            return 0;
        }
    };

    parse_count(&output).unwrap_or_else(|| {
        warn!(%output, "unexpected GPU count output, assuming no GPUs");
        0
    })
}

/// Product name of the GPU at `index`, empty when it cannot be determined.
pub fn gpu_name(runner: &dyn CommandRunner, program: &str, index: u32) -> String {
    runner
        .run(program, &query_args(GpuField::Name, Some(index)))
        .map(|name| name.trim().to_owned())
        .unwrap_or_default()
}

/// Enumerate GPUs and build one collector per device.
///
/// Runs once; devices appearing later are not picked up. Enumeration
/// failures degrade to fewer (possibly zero) collectors instead of an error.
pub fn discover(
    runner: Arc<dyn CommandRunner>,
    options: &CollectorOptions,
) -> Vec<GpuInfoCollector> {
    let count = gpu_count(runner.as_ref(), &options.program);
    info!(count, "discovered GPUs");

    (0..count)
        .filter_map(|index| {
            let name = gpu_name(runner.as_ref(), &options.program, index);
            match GpuInfoCollector::new(runner.clone(), index, name, options.clone()) {
                Ok(collector) => {
                    info!(gpu = index, name = collector.name(), "collector ready");
                    Some(collector)
                }
                Err(e) => {
                    warn!(gpu = index, error = %e, "skipping GPU");
                    None
                }
            }
        })
        .collect()
}

/// Register every collector with `registry`, returning how many were added.
///
/// # Errors
///
/// Fails on the first collector the registry rejects, e.g. a duplicate.
pub fn register_all(
    registry: &Registry,
    collectors: Vec<GpuInfoCollector>,
) -> Result<usize, ExporterError> {
    let count = collectors.len();
    for collector in collectors {
        registry.register(Box::new(collector))?;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;
    use prometheus::core::Collector;

    #[test]
    fn test_discover_builds_one_collector_per_gpu() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.set(GpuField::Count, "2");
        runner.set(GpuField::Name, "Tesla T4");

        let collectors = discover(runner.clone(), &CollectorOptions::default());

        assert_eq!(collectors.len(), 2);
        let seqs: Vec<&str> = collectors
            .iter()
            .map(|c| c.labels()["gpu_seq"].as_str())
            .collect();
        assert_eq!(seqs, ["0", "1"]);
        assert!(collectors.iter().all(|c| c.name() == "Tesla T4"));

        let calls = runner.calls();
        assert_eq!(calls[0].args[0], "--query-gpu=count");
        assert_eq!(
            calls[1].args.join(" "),
            "--query-gpu=name --format=csv,noheader,nounits -i 0"
        );
        assert_eq!(
            calls[2].args.join(" "),
            "--query-gpu=name --format=csv,noheader,nounits -i 1"
        );
    }

    #[test]
    fn test_discover_reads_first_count_line() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.set(GpuField::Count, "3\n3\n3");

        assert_eq!(discover(runner, &CollectorOptions::default()).len(), 3);
    }

    #[test]
    fn test_discover_without_tool() {
        let runner = Arc::new(ScriptedRunner::new());

        assert!(discover(runner, &CollectorOptions::default()).is_empty());
    }

    #[test]
    fn test_discover_with_garbage_count() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.set(GpuField::Count, "No devices were found");

        assert!(discover(runner, &CollectorOptions::default()).is_empty());
    }

    #[test]
    fn test_missing_name_is_empty() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.set(GpuField::Count, "1");

        let collectors = discover(runner, &CollectorOptions::default());
        assert_eq!(collectors.len(), 1);
        assert_eq!(collectors[0].name(), "");
        assert_eq!(collectors[0].desc().len(), 5);
    }

    #[test]
    fn test_register_all() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.set(GpuField::Count, "2");
        runner.set(GpuField::Name, "NVIDIA A100-SXM4-40GB");
        runner.set(GpuField::Temperature, "33");

        let registry = Registry::new();
        let collectors = discover(runner, &CollectorOptions::default());
        assert_eq!(register_all(&registry, collectors).unwrap(), 2);

        let families = registry.gather();
        assert_eq!(families.len(), 5);

        let text = crate::server::encode_text(&families).unwrap();
        assert!(text.contains(r#"gpu_temperature{gpu_seq="0",name="NVIDIA A100-SXM4-40GB"} 33"#));
        assert!(text.contains(r#"gpu_temperature{gpu_seq="1",name="NVIDIA A100-SXM4-40GB"} 33"#));
        assert_eq!(text.matches("# TYPE gpu_temperature gauge").count(), 1);
    }

    #[test]
    fn test_register_all_rejects_duplicates() {
        let runner: Arc<ScriptedRunner> = Arc::new(ScriptedRunner::new());
        let options = CollectorOptions::default();
        let first = GpuInfoCollector::new(runner.clone(), 0, "T4", options.clone()).unwrap();
        let second = GpuInfoCollector::new(runner, 0, "T4", options).unwrap();

        let registry = Registry::new();
        assert!(register_all(&registry, vec![first, second]).is_err());
    }
}
