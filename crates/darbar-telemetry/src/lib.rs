mod metrics;

pub use metrics::{HistogramSummary, MetricSample, MetricsRecorder, MetricsSnapshot};

use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level directive. Overridden by `RUST_LOG`.
    pub log_level: String,
    /// Per-target level overrides (e.g. `("darbar_store", "debug")`).
    pub module_levels: Vec<(String, String)>,
    /// JSON lines when true, human-readable otherwise.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            module_levels: Vec::new(),
            json: true,
        }
    }
}

impl TelemetryConfig {
    /// `EnvFilter` directive string built from the configured levels.
    pub fn filter_directives(&self) -> String {
        let mut filter = self.log_level.to_lowercase();
        for (module, level) in &self.module_levels {
            filter.push_str(&format!(",{}={}", module, level.to_lowercase()));
        }
        filter
    }
}

/// Keeps the process-wide metrics recorder alive for the life of the binary.
pub struct TelemetryGuard {
    metrics: Arc<MetricsRecorder>,
}

impl TelemetryGuard {
    pub fn metrics(&self) -> Arc<MetricsRecorder> {
        self.metrics.clone()
    }
}

/// Initialize the telemetry subsystem. Call once at startup; later calls
/// keep the first subscriber and still return a fresh recorder.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let directives = config.filter_directives();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(&directives).unwrap_or_else(|e| {
            eprintln!("darbar-telemetry: bad log filter {directives:?}: {e}");
            EnvFilter::new("info")
        })
    });

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter))
        .try_init()
    {
        tracing::debug!(error = %e, "tracing subscriber already installed");
    }

    TelemetryGuard {
        metrics: Arc::new(MetricsRecorder::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_directives_include_module_overrides() {
        let config = TelemetryConfig {
            log_level: "WARN".into(),
            module_levels: vec![
                ("darbar_store".into(), "debug".into()),
                ("tower_http".into(), "Trace".into()),
            ],
            json: false,
        };
        assert_eq!(
            config.filter_directives(),
            "warn,darbar_store=debug,tower_http=trace"
        );
    }

    #[test]
    fn default_config_is_json_info() {
        let config = TelemetryConfig::default();
        assert!(config.json);
        assert_eq!(config.filter_directives(), "info");
    }

    #[test]
    fn init_twice_does_not_panic() {
        let first = init_telemetry(TelemetryConfig::default());
        let second = init_telemetry(TelemetryConfig {
            json: false,
            ..TelemetryConfig::default()
        });
        first.metrics().counter_inc("a", &[], 1);
        assert_eq!(second.metrics().counter_get("a", &[]), 0);
    }
}
