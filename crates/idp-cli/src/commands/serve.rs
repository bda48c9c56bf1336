//! Serve command - HTTP facade plus the upload endpoint that feeds the pipeline.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::put;
use clap::Args;
use console::style;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use idp_core::storage::ObjectStore;
use idp_core::transport::DeliveryReport;
use idp_core::{ApiRequest, ApiResponse, Pipeline, PipelineError, QueryFacade};

use super::LocalContext;

/// Arguments for the serve command.
#[derive(Args)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,

    /// Largest accepted upload in megabytes
    #[arg(long, default_value = "25")]
    max_upload_mb: usize,

    /// How often finished deliveries are collected and reported
    #[arg(long, default_value = "500")]
    settle_interval_ms: u64,
}

#[derive(Clone)]
struct AppState {
    facade: Arc<QueryFacade>,
    pipeline: Arc<Pipeline>,
    objects: Arc<dyn ObjectStore>,
}

pub async fn run(args: ServeArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let ctx = LocalContext::load(config_path)?;
    let state = AppState {
        facade: Arc::new(ctx.facade()),
        pipeline: Arc::new(ctx.pipeline()),
        objects: ctx.objects.clone(),
    };

    let (shutdown, shutdown_rx) = watch::channel(false);
    let reporter = spawn_reporter(
        state.pipeline.clone(),
        Duration::from_millis(args.settle_interval_ms.max(1)),
        shutdown_rx,
    );

    let app = router(state).layer(DefaultBodyLimit::max(args.max_upload_mb * 1024 * 1024));
    let listener = tokio::net::TcpListener::bind(args.listen).await?;

    println!(
        "{} Listening on http://{} (uploads land in {}, alerts in {})",
        style("✓").green(),
        listener.local_addr()?,
        ctx.config.storage.root_dir.display(),
        ctx.alerts_outbox().display()
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await;

    info!("Shutting down; waiting for in-flight deliveries");
    shutdown.send_replace(true);
    reporter.await?;

    served?;
    Ok(())
}

/// Collect delivery reports in the background until shutdown is signalled.
///
/// A settle round is never cancelled once started. After the signal one
/// final round drains whatever is still in flight.
fn spawn_reporter(
    pipeline: Arc<Pipeline>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
            log_failures(&pipeline.settle().await);
        }
        log_failures(&pipeline.settle().await);
    })
}

fn log_failures(reports: &[DeliveryReport]) {
    for report in reports.iter().filter(|r| !r.is_delivered()) {
        warn!(
            "{} did not handle message {}",
            report.subscriber, report.message_id
        );
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/objects/*key", put(upload_object))
        .fallback(facade_route)
        .with_state(state)
}

async fn facade_route(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let request = ApiRequest {
        method: method.as_str().to_string(),
        path: uri.path().to_string(),
        query,
    };
    to_response(state.facade.handle(&request).await)
}

async fn upload_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let Some(token) = query.get("token") else {
        return to_response(ApiResponse::from_error(&PipelineError::invalid(
            "token parameter is required",
        )));
    };

    if let Err(e) = state.objects.put_with_grant(&key, token, body.to_vec()).await {
        warn!("Upload to {} refused: {}", key, e);
        return to_response(ApiResponse::from_error(&PipelineError::from(e)));
    }

    match state.pipeline.document_stored(&key).await {
        Ok(message_id) => {
            info!("Stored {}; storage event {}", key, message_id);
            to_response(ApiResponse::json(200, &json!({ "key": key })))
        }
        Err(e) => to_response(ApiResponse::from_error(&e)),
    }
}

fn to_response(api: ApiResponse) -> Response {
    let status = StatusCode::from_u16(api.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, api.body).into_response();

    let headers = response.headers_mut();
    for (name, value) in &api.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use idp_core::models::config::{DeliveryConfig, IdpConfig};
    use idp_core::storage::{InMemoryObjectStore, InMemoryRecordStore};
    use idp_core::transport::RecordingPublisher;
    use tower::ServiceExt;

    const PUBLIC_URL: &str = "http://localhost:8080/objects";

    struct TestServer {
        state: AppState,
        objects: Arc<InMemoryObjectStore>,
        records: Arc<InMemoryRecordStore>,
        alerts: Arc<RecordingPublisher>,
    }

    fn server(delivery: DeliveryConfig) -> TestServer {
        let config = IdpConfig {
            delivery,
            ..IdpConfig::default()
        };
        let objects = Arc::new(InMemoryObjectStore::with_public_url("invoices", PUBLIC_URL));
        let records = Arc::new(InMemoryRecordStore::new("invoices"));
        let alerts = Arc::new(RecordingPublisher::new());

        let state = AppState {
            facade: Arc::new(QueryFacade::new(
                objects.clone(),
                records.clone(),
                Duration::from_secs(300),
            )),
            pipeline: Arc::new(Pipeline::new(
                &config,
                objects.clone(),
                records.clone(),
                alerts.clone(),
            )),
            objects: objects.clone(),
        };

        TestServer {
            state,
            objects,
            records,
            alerts,
        }
    }

    fn quick_delivery() -> DeliveryConfig {
        DeliveryConfig {
            max_attempts: 2,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    fn request(method: &str, uri: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_upload_without_token_is_rejected() {
        let s = server(quick_delivery());

        let response = router(s.state.clone())
            .oneshot(request("PUT", "/objects/a.pdf", b"%PDF".to_vec()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            HeaderValue::from_static("*")
        );
        assert_eq!(
            body_json(response).await,
            json!({ "error": "token parameter is required" })
        );
        assert!(s.objects.is_empty().await);
    }

    #[tokio::test]
    async fn test_upload_with_wrong_or_expired_grant_is_forbidden() {
        let s = server(quick_delivery());

        s.objects
            .presign_put("a.pdf", "application/pdf", Duration::from_secs(300))
            .await
            .unwrap();
        let response = router(s.state.clone())
            .oneshot(request("PUT", "/objects/a.pdf?token=forged", b"%PDF".to_vec()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let stale = s
            .objects
            .presign_put("b.pdf", "application/pdf", Duration::ZERO)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let response = router(s.state.clone())
            .oneshot(request(
                "PUT",
                &format!("/objects/b.pdf?token={}", stale.token),
                b"%PDF".to_vec(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        assert!(s.objects.is_empty().await);
        assert!(s.state.pipeline.settle().await.is_empty());
    }

    #[tokio::test]
    async fn test_granted_upload_runs_the_pipeline() {
        let s = server(quick_delivery());

        let response = router(s.state.clone())
            .oneshot(request(
                "GET",
                "/upload-url?filename=high%20invoice%20%231.pdf&contentType=application/pdf",
                Vec::new(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let grant = body_json(response).await;
        let key = grant["key"].as_str().unwrap().to_string();
        assert!(key.ends_with("-high invoice #1.pdf"));

        let upload_url = grant["uploadUrl"].as_str().unwrap();
        let path_and_query = upload_url.strip_prefix("http://localhost:8080").unwrap();
        assert!(!path_and_query.contains(' '));
        assert!(!path_and_query.contains('#'));

        let response = router(s.state.clone())
            .oneshot(request("PUT", path_and_query, b"%PDF-1.4".to_vec()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "key": key }));

        let reports = s.state.pipeline.settle().await;
        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.is_delivered()));
        assert!(s.objects.exists(&key).await.unwrap());
        assert!(s.records.get(&key).await.is_some());
        assert_eq!(s.alerts.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_facade_responses_carry_cors_headers() {
        let s = server(quick_delivery());

        let response = router(s.state.clone())
            .oneshot(request("OPTIONS", "/upload-url", Vec::new()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers()["access-control-allow-methods"],
            HeaderValue::from_static("OPTIONS,GET,PUT")
        );

        let response = router(s.state.clone())
            .oneshot(request("GET", "/invoices", Vec::new()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            HeaderValue::from_static("application/json")
        );
        assert_eq!(body_json(response).await, json!([]));
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_retrying_deliveries() {
        let s = server(DeliveryConfig {
            max_attempts: 3,
            initial_backoff_ms: 50,
            max_backoff_ms: 50,
        });
        s.alerts.fail_next(1);

        let (shutdown, shutdown_rx) = watch::channel(false);
        let reporter = spawn_reporter(
            s.state.pipeline.clone(),
            Duration::from_millis(1),
            shutdown_rx,
        );

        s.state
            .pipeline
            .ingest("high-invoice.pdf", b"%PDF".to_vec(), "application/pdf")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        shutdown.send_replace(true);
        reporter.await.unwrap();

        assert!(s.records.get("high-invoice.pdf").await.is_some());
        assert_eq!(s.alerts.messages().len(), 1);
        assert!(s.state.pipeline.dead_letters().is_empty());
    }
}
