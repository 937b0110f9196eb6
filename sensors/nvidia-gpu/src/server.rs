//! Scrape endpoint.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, Registry, TextEncoder, TEXT_FORMAT};
use smi_exporter_core::ExporterError;
use std::net::SocketAddr;
use tracing::{error, info};

const LANDING_PAGE: &str = "<html>\
<head><title>smi-exporter</title></head>\
<body><h1>smi-exporter</h1><p><a href=\"/metrics\">Metrics</a></p></body>\
</html>";

/// Encode metric families in the Prometheus text exposition format.
pub fn encode_text(families: &[MetricFamily]) -> Result<String, ExporterError> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| ExporterError::parse_with_source("Encoded metrics are not UTF-8", e))
}

/// Build the router.
///
/// Routes:
/// - GET / - Landing page
/// - GET /metrics - Prometheus text format
pub fn router(registry: Registry) -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/metrics", get(metrics))
        .with_state(registry)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: SocketAddr, registry: Registry) -> Result<(), ExporterError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Serving metrics on http://{}/metrics", listener.local_addr()?);
    axum::serve(listener, router(registry)).await?;
    Ok(())
}

async fn landing() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], LANDING_PAGE)
}

/// GET /metrics
///
/// Collection spawns subprocesses, so it runs on the blocking pool.
async fn metrics(State(registry): State<Registry>) -> Response {
    let gathered = tokio::task::spawn_blocking(move || encode_text(&registry.gather())).await;

    match gathered {
        Ok(Ok(body)) => ([(header::CONTENT_TYPE, TEXT_FORMAT)], body).into_response(),
        Ok(Err(e)) => {
            error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(e) => {
            error!("Metrics collection task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{CollectorOptions, GpuInfoCollector};
    use crate::query::GpuField;
    use crate::testing::ScriptedRunner;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn get_body(app: Router, uri: &str) -> (StatusCode, Option<String>, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_owned());
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, content_type, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.set(GpuField::Utilization, "12");
        let registry = Registry::new();
        let collector =
            GpuInfoCollector::new(runner, 0, "Tesla T4", CollectorOptions::default()).unwrap();
        registry.register(Box::new(collector)).unwrap();

        let (status, content_type, body) = get_body(router(registry), "/metrics").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some(TEXT_FORMAT));
        assert!(body.contains(r#"gpu_utilization{gpu_seq="0",name="Tesla T4"} 12"#));
    }

    #[tokio::test]
    async fn test_metrics_endpoint_without_gpus() {
        let (status, _, body) = get_body(router(Registry::new()), "/metrics").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_landing_page_links_metrics() {
        let (status, _, body) = get_body(router(Registry::new()), "/").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("/metrics"));
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let (status, _, _) = get_body(router(Registry::new()), "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
