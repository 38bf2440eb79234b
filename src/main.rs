use std::sync::Arc;

use quantumpulse::storage::{JsonlSink, LogSink, NullSink};
use quantumpulse::tracing::{init_tracing, shutdown_tracing};
use quantumpulse::{PlaceholderTick, Supervisor, SupervisorOptions};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok();
    if let Err(e) = init_tracing("quantumpulse-agent", otlp_endpoint.as_deref()) {
        eprintln!("[WARN] tracing init failed: {}", e);
    }

    let options = SupervisorOptions::from_env();
    let sink: Arc<dyn LogSink> = match std::env::var("QP_SINK_PATH") {
        Ok(path) => match JsonlSink::new(&path) {
            Ok(sink) => {
                info!(path = %path, "writing worker log to JSONL sink");
                Arc::new(sink)
            }
            Err(e) => {
                warn!(path = %path, error = %e, "cannot open sink, continuing without one");
                Arc::new(NullSink)
            }
        },
        Err(_) => Arc::new(NullSink),
    };

    let supervisor = Supervisor::with_options(Arc::new(PlaceholderTick::default()), sink, options);
    let started = supervisor.start();
    info!(
        started = started.started,
        interval_secs = started.status.interval_seconds,
        "supervisor running, press Ctrl+C to stop"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl+C");
    }

    supervisor.shutdown().await;
    match serde_json::to_string_pretty(&supervisor.status()) {
        Ok(json) => println!("{}", json),
        Err(e) => warn!(error = %e, "failed to encode final status"),
    }
    for line in supervisor.get_logs(10) {
        println!("{}", line);
    }

    shutdown_tracing();
}
