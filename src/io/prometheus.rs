//! Prometheus metrics HTTP endpoint
//!
//! - `GET /metrics` - Prometheus text format
//! - `GET /health` - liveness
//! - `GET /in-range` - current in-range beacons as JSON

use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use crate::services::region_monitor::MonitorHandle;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    client: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{client=\"{client}\"}} {val}");
}

fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    client: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in METRICS_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{client=\"{client}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{client=\"{client}\",le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let _ = writeln!(output, "{name}_sum{{client=\"{client}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{client=\"{client}\"}} {count}");
}

fn format_prometheus_metrics(metrics: &Metrics, client: &str) -> String {
    let summary = metrics.report();
    let mut output = String::with_capacity(4096);

    write_callback_metrics(&mut output, client, &summary);
    write_delivery_metrics(&mut output, client, &summary);
    write_registry_metrics(&mut output, client, &summary);

    output
}

fn write_callback_metrics(output: &mut String, client: &str, summary: &MetricsSummary) {
    let counters = [
        ("beacon_callbacks_total", "Scanner callbacks received", summary.callbacks_total),
        (
            "beacon_unknown_region_total",
            "Callbacks for regions not in the registry",
            summary.unknown_region_total,
        ),
        (
            "beacon_duplicates_suppressed_total",
            "Duplicate enter/exit callbacks suppressed",
            summary.duplicates_suppressed_total,
        ),
        (
            "beacon_state_determined_total",
            "Informational state callbacks",
            summary.state_determined_total,
        ),
        ("beacon_enters_total", "Delivered enter events", summary.enters_total),
        ("beacon_exits_total", "Delivered exit events", summary.exits_total),
    ];
    for (name, help, val) in counters {
        write_metric(output, name, help, MetricType::Counter, client, val);
    }

    write_histogram(
        output,
        "beacon_apply_latency_us",
        "Time to apply a callback under the region lock in microseconds",
        client,
        &summary.apply_lat_buckets,
        summary.apply_lat_sum_us,
    );
    write_metric(
        output,
        "beacon_apply_latency_max_us",
        "Maximum apply latency",
        MetricType::Gauge,
        client,
        summary.apply_lat_max_us,
    );
}

fn write_delivery_metrics(output: &mut String, client: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "beacon_publish_ok_total",
        "Presence messages handed to the transport",
        MetricType::Counter,
        client,
        summary.publish_ok_total,
    );
    write_metric(
        output,
        "beacon_publish_failed_total",
        "Presence messages the transport rejected",
        MetricType::Counter,
        client,
        summary.publish_failed_total,
    );
    write_metric(
        output,
        "beacon_resolution_miss_total",
        "Delivered events whose beacon was missing from the registry",
        MetricType::Counter,
        client,
        summary.resolution_miss_total,
    );
    write_metric(
        output,
        "beacon_notifications_total",
        "Local alerts raised",
        MetricType::Counter,
        client,
        summary.notifications_total,
    );
    write_metric(
        output,
        "beacon_in_range",
        "Beacons currently in range",
        MetricType::Gauge,
        client,
        summary.beacons_in_range,
    );
}

fn write_registry_metrics(output: &mut String, client: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "beacon_regions_watched",
        "Regions currently monitored",
        MetricType::Gauge,
        client,
        summary.regions_watched,
    );
    write_metric(
        output,
        "beacon_rebuilds_total",
        "Region set rebuilds",
        MetricType::Counter,
        client,
        summary.rebuilds_total,
    );
    write_metric(
        output,
        "beacon_registry_errors_total",
        "Definitions rejected during rebuilds",
        MetricType::Counter,
        client,
        summary.registry_errors_total,
    );
    write_metric(
        output,
        "beacon_uptime_seconds",
        "Seconds since start",
        MetricType::Gauge,
        client,
        summary.uptime_secs,
    );
}

fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    monitor: MonitorHandle,
    client: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => respond(
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            format_prometheus_metrics(&metrics, &client),
        ),
        (&Method::GET, "/health") => respond(StatusCode::OK, "text/plain", "ok"),
        (&Method::GET, "/in-range") => match serde_json::to_vec(&monitor.in_range()) {
            Ok(body) => respond(StatusCode::OK, "application/json", body),
            Err(e) => {
                error!(error = %e, "in_range_encode_failed");
                respond(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", "encode error")
            }
        },
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "Not Found"),
    };
    Ok(response)
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    monitor: MonitorHandle,
    client: String,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let client = Arc::new(client);

    info!(port = %port, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let monitor = monitor.clone();
                        let client = client.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                handle_request(req, metrics.clone(), monitor.clone(), client.clone())
                            });

                            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_prometheus_metrics() {
        let metrics = Metrics::new();
        metrics.record_callback();
        metrics.record_enter();
        metrics.record_apply_latency(15);
        metrics.record_apply_latency(18);
        metrics.record_rebuild(3, 1);

        let output = format_prometheus_metrics(&metrics, "pi");

        assert!(output.contains("beacon_callbacks_total{client=\"pi\"} 1"));
        assert!(output.contains("beacon_enters_total{client=\"pi\"} 1"));
        assert!(output.contains("beacon_apply_latency_us_bucket{client=\"pi\",le=\"20\"} 2"));
        assert!(output.contains("beacon_apply_latency_us_count{client=\"pi\"} 2"));
        // Exact sum, not avg * count (32)
        assert!(output.contains("beacon_apply_latency_us_sum{client=\"pi\"} 33"));
        assert!(output.contains("beacon_regions_watched{client=\"pi\"} 3"));
        assert!(output.contains("beacon_registry_errors_total{client=\"pi\"} 1"));
    }
}
