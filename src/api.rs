//! HTTP API: Evolution webhook receiver, image proxy, health, and record
//! listing. Local-store media is served under `/media`.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use url::Url;
use wamedia_core::config::ProxyConfig;
use wamedia_evolution::EvolutionClient;
use wamedia_media::{
    fix_malformed_url, mime::mime_for_extension, payload::WebhookEnvelope, sniff, Classifier,
    Sniffed,
};

use crate::fetch::Fetcher;
use crate::pipeline::{IngestSummary, Ingestor};

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 500;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub ingestor: Arc<Ingestor>,
    pub fetcher: Arc<dyn Fetcher>,
    pub classifier: Arc<Classifier>,
    pub proxy: ProxyConfig,
    pub evolution: Option<Arc<EvolutionClient>>,
    /// `None` = accept every webhook.
    pub webhook_secret: Option<String>,
    pub body_limit: usize,
    pub uptime: Instant,
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": msg.into() })))
}

/// Constant-time string comparison to prevent timing attacks on the secret.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[derive(Debug, Default, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Evolution sends the secret as the `apikey` header; some deployments put
/// it in the webhook URL as `?token=` instead.
fn check_secret(headers: &HeaderMap, query: &TokenQuery, secret: &Option<String>) -> Option<ApiError> {
    let secret = secret.as_ref()?;
    let presented = headers
        .get("apikey")
        .and_then(|v| v.to_str().ok())
        .or(query.token.as_deref());
    match presented {
        Some(p) if constant_time_eq(p, secret) => None,
        Some(_) => Some(api_error(StatusCode::UNAUTHORIZED, "invalid webhook secret")),
        None => Some(api_error(StatusCode::UNAUTHORIZED, "missing webhook secret")),
    }
}

/// `POST /api/webhooks/evolution`
async fn evolution_webhook(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_secret(&headers, &query, &state.webhook_secret) {
        warn!("webhook rejected: bad or missing secret");
        return Err(err);
    }

    let envelope = WebhookEnvelope::parse(&body)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    let outcomes = state.ingestor.ingest(&envelope).await.map_err(|e| {
        error!("webhook ingest failed for instance {}: {e}", envelope.instance);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    let summary = IngestSummary::from_outcomes(&outcomes);
    if summary.processed > 0 {
        info!(
            "webhook {} from {}: processed={} stored={} failed={}",
            envelope.event, envelope.instance, summary.processed, summary.stored, summary.failed
        );
    }

    Ok(Json(json!({
        "status": "ok",
        "processed": summary.processed,
        "stored": summary.stored,
        "failed": summary.failed,
    })))
}

/// `POST /api/webhooks/evolution/{event}`, used when Evolution has
/// "webhook by events" on. The event name in the body is authoritative.
async fn evolution_webhook_by_event(
    State(state): State<ApiState>,
    Path(_event): Path<String>,
    headers: HeaderMap,
    query: Query<TokenQuery>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    evolution_webhook(State(state), headers, query, body).await
}

#[derive(Debug, Deserialize)]
struct ProxyQuery {
    url: Option<String>,
}

/// `GET /api/image-proxy?url=`
async fn image_proxy(
    State(state): State<ApiState>,
    Query(query): Query<ProxyQuery>,
) -> Result<Response, ApiError> {
    let raw = query
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "missing url parameter"))?;

    let fixed = fix_malformed_url(raw.trim());
    let parsed =
        Url::parse(&fixed).map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("invalid url: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(api_error(StatusCode::BAD_REQUEST, "only http(s) urls can be proxied"));
    }
    let host = parsed.host_str().unwrap_or("");
    if !state.proxy.allows(host) {
        return Err(api_error(
            StatusCode::FORBIDDEN,
            format!("host '{host}' is not allowed"),
        ));
    }

    let fetched = state.fetcher.fetch(&fixed).await.map_err(|e| {
        warn!("image proxy fetch failed for {fixed}: {e}");
        api_error(StatusCode::BAD_GATEWAY, e.to_string())
    })?;

    let content_type = match sniff(&fetched.bytes) {
        Sniffed::ErrorPage => {
            return Err(api_error(
                StatusCode::BAD_GATEWAY,
                "upstream returned an error page",
            ))
        }
        Sniffed::Empty => {
            return Err(api_error(StatusCode::BAD_GATEWAY, "upstream returned no bytes"))
        }
        sniffed => sniffed
            .mime()
            .map(str::to_string)
            .or(fetched.content_type)
            .unwrap_or_else(|| "application/octet-stream".to_string()),
    };

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "public, max-age=86400".to_string()),
        ],
        fetched.bytes,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct HealthQuery {
    instance: Option<String>,
}

/// `GET /api/health`
async fn health(
    State(state): State<ApiState>,
    Query(query): Query<HealthQuery>,
) -> Result<Json<Value>, ApiError> {
    let counts = state
        .ingestor
        .records()
        .count_by_status()
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let evolution = match (&state.evolution, query.instance.as_deref()) {
        (None, _) => json!("not_configured"),
        (Some(_), None) => json!("configured"),
        (Some(client), Some(instance)) => match client.connection_state(instance).await {
            Ok(s) => json!({ "instance": s.instance, "state": s.state }),
            Err(e) => json!({ "instance": instance, "error": e.to_string() }),
        },
    };

    Ok(Json(json!({
        "status": "ok",
        "uptime_secs": state.uptime.elapsed().as_secs(),
        "store": state.ingestor.media_store().name(),
        "messages": counts,
        "evolution": evolution,
    })))
}

#[derive(Debug, Deserialize)]
struct MessagesQuery {
    instance: Option<String>,
    limit: Option<i64>,
}

/// `GET /api/messages?instance=&limit=`
async fn list_messages(
    State(state): State<ApiState>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let instance = query.instance.as_deref().filter(|i| !i.is_empty());
    let records = state
        .ingestor
        .records()
        .recent_messages(instance, limit)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    // `display_kind` is what a renderer would infer from `content` alone.
    let items: Vec<Value> = records
        .iter()
        .map(|r| {
            let mut v = serde_json::to_value(r).unwrap_or(Value::Null);
            if let Value::Object(map) = &mut v {
                map.insert(
                    "display_kind".into(),
                    json!(state.classifier.classify(&r.content)),
                );
            }
            v
        })
        .collect();

    Ok(Json(json!({ "count": items.len(), "messages": items })))
}

/// `GET /media/{*key}`, objects from the configured store.
async fn serve_media(
    State(state): State<ApiState>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let bytes = state
        .ingestor
        .media_store()
        .get(&key)
        .await
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "not found"))?;

    let ext = key.rsplit_once('.').map(|(_, e)| e).unwrap_or("");
    let content_type = mime_for_extension(ext).unwrap_or("application/octet-stream");
    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable".to_string()),
        ],
        bytes,
    )
        .into_response())
}

/// Build the axum router with shared state.
pub fn build_router(state: ApiState) -> Router {
    let body_limit = state.body_limit;
    Router::new()
        .route("/api/health", get(health))
        .route("/api/webhooks/evolution", post(evolution_webhook))
        .route("/api/webhooks/evolution/{event}", post(evolution_webhook_by_event))
        .route("/api/image-proxy", get(image_proxy))
        .route("/api/messages", get(list_messages))
        .route("/media/{*key}", get(serve_media))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(addr: &str, state: ApiState) -> std::io::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API server listening on {addr}");
    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::Fetched;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::collections::HashMap;
    use wamedia_core::config::MemoryConfig;
    use wamedia_core::error::WamediaError;
    use wamedia_memory::Store;
    use wamedia_storage::LocalStore;
    use tower::ServiceExt;

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
    const JPEG_B64: &str = "/9j/4AAQSkZJRgAAAAAAAAAAAA==";

    /// Canned upstream responses keyed by URL: `(body, content type)`.
    #[derive(Default)]
    struct MockFetcher {
        responses: HashMap<String, (Vec<u8>, Option<String>)>,
    }

    #[async_trait]
    impl Fetcher for MockFetcher {
        async fn fetch(&self, url: &str) -> Result<Fetched, WamediaError> {
            match self.responses.get(url) {
                Some((bytes, ct)) => Ok(Fetched {
                    bytes: bytes.clone(),
                    content_type: ct.clone(),
                }),
                None => Err(WamediaError::Fetch("upstream returned 404 Not Found".into())),
            }
        }
    }

    struct TestApp {
        router: Router,
        _dir: tempfile::TempDir,
    }

    async fn test_app(secret: Option<&str>, fetcher: MockFetcher) -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let records = Store::new(&MemoryConfig {
            db_path: dir.path().join("messages.db").to_string_lossy().into_owned(),
        })
        .await
        .unwrap();
        let media = Arc::new(LocalStore::new(dir.path().join("media"), "http://127.0.0.1:3000/media"));
        let fetcher: Arc<dyn Fetcher> = Arc::new(fetcher);
        let ingestor = Ingestor::new(media, records, fetcher.clone(), None);
        let state = ApiState {
            ingestor: Arc::new(ingestor),
            fetcher,
            classifier: Arc::new(Classifier::default()),
            proxy: ProxyConfig::default(),
            evolution: None,
            webhook_secret: secret.map(str::to_string),
            body_limit: 1024 * 1024,
            uptime: Instant::now(),
        };
        TestApp {
            router: build_router(state),
            _dir: dir,
        }
    }

    fn with_response(url: &str, body: &[u8], ct: Option<&str>) -> MockFetcher {
        let mut f = MockFetcher::default();
        f.responses
            .insert(url.to_string(), (body.to_vec(), ct.map(str::to_string)));
        f
    }

    fn upsert_body() -> String {
        json!({
            "event": "messages.upsert",
            "instance": "vendas",
            "data": [
                {
                    "key": { "remoteJid": "5511988887777@s.whatsapp.net", "fromMe": false, "id": "A1" },
                    "message": { "conversation": "oi" },
                    "messageTimestamp": 1715349802
                },
                {
                    "key": { "remoteJid": "5511988887777@s.whatsapp.net", "fromMe": false, "id": "A2" },
                    "message": { "imageMessage": { "mimetype": "image/jpeg" }, "base64": JPEG_B64 },
                    "messageTimestamp": 1715349803
                },
                {
                    "key": { "remoteJid": "5511988887777@s.whatsapp.net", "fromMe": false, "id": "A3" },
                    "message": { "stickerMessage": { "url": "https://mmg.whatsapp.net/v/t62.15575-24/x.enc" } },
                    "messageTimestamp": 1715349804
                }
            ]
        })
        .to_string()
    }

    fn webhook_request(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    /// Parse response body as JSON.
    async fn body_json(resp: axum::http::Response<Body>) -> Value {
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app(None, MockFetcher::default()).await;
        let req = Request::get("/api/health").body(Body::empty()).unwrap();
        let resp = app.router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["store"], "local");
        assert_eq!(json["evolution"], "not_configured");
        assert!(json["uptime_secs"].is_u64());
    }

    #[tokio::test]
    async fn test_webhook_processes_batch() {
        let app = test_app(None, MockFetcher::default()).await;
        let resp = app
            .router
            .clone()
            .oneshot(webhook_request("/api/webhooks/evolution", &upsert_body()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["processed"], 3);
        assert_eq!(json["stored"], 1);
        assert_eq!(json["failed"], 1);

        let req = Request::get("/api/messages?instance=vendas&limit=10")
            .body(Body::empty())
            .unwrap();
        let json = body_json(app.router.clone().oneshot(req).await.unwrap()).await;
        assert_eq!(json["count"], 3);
        let msgs = json["messages"].as_array().unwrap();
        // Newest first.
        assert_eq!(msgs[0]["message_id"], "A3");
        assert_eq!(msgs[0]["content"], "[Sticker]");
        assert_eq!(msgs[0]["media_status"], "failed");
        assert_eq!(msgs[1]["display_kind"], "image");
        assert_eq!(msgs[2]["display_kind"], "text");

        // Stored media is served back.
        let url = msgs[1]["content"].as_str().unwrap();
        let path = url.strip_prefix("http://127.0.0.1:3000").unwrap();
        let req = Request::get(path).body(Body::empty()).unwrap();
        let resp = app.router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/jpeg");
    }

    #[tokio::test]
    async fn test_webhook_by_event_path() {
        let app = test_app(None, MockFetcher::default()).await;
        let resp = app
            .router
            .oneshot(webhook_request(
                "/api/webhooks/evolution/messages-upsert",
                &upsert_body(),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["processed"], 3);
    }

    #[tokio::test]
    async fn test_webhook_ignores_other_events() {
        let app = test_app(None, MockFetcher::default()).await;
        let body = json!({ "event": "connection.update", "instance": "vendas", "data": { "state": "open" } });
        let resp = app
            .router
            .oneshot(webhook_request("/api/webhooks/evolution", &body.to_string()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["processed"], 0);
    }

    #[tokio::test]
    async fn test_webhook_malformed_json_returns_400() {
        let app = test_app(None, MockFetcher::default()).await;
        let resp = app
            .router
            .oneshot(webhook_request("/api/webhooks/evolution", "{not json"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(resp).await["error"]
            .as_str()
            .unwrap()
            .contains("invalid webhook body"));
    }

    #[tokio::test]
    async fn test_webhook_secret_header_and_query() {
        let app = test_app(Some("s3cret"), MockFetcher::default()).await;

        let resp = app
            .router
            .clone()
            .oneshot(webhook_request("/api/webhooks/evolution", &upsert_body()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = Request::post("/api/webhooks/evolution")
            .header("Content-Type", "application/json")
            .header("apikey", "wrong")
            .body(Body::from(upsert_body()))
            .unwrap();
        let resp = app.router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = Request::post("/api/webhooks/evolution")
            .header("Content-Type", "application/json")
            .header("apikey", "s3cret")
            .body(Body::from(upsert_body()))
            .unwrap();
        let resp = app.router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .router
            .oneshot(webhook_request(
                "/api/webhooks/evolution?token=s3cret",
                &upsert_body(),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_webhook_body_limit() {
        let app = test_app(None, MockFetcher::default()).await;
        let huge = format!("{{\"event\":\"x\",\"pad\":\"{}\"}}", "a".repeat(2 * 1024 * 1024));
        let resp = app
            .router
            .oneshot(webhook_request("/api/webhooks/evolution", &huge))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_image_proxy_repairs_and_sniffs() {
        let fixed = "https://firebasestorage.googleapis.com/v0/b/crm/o/images%2Fa.jpg?alt=media";
        let app = test_app(None, with_response(fixed, JPEG, Some("application/octet-stream"))).await;
        let broken = "https://firebasestorage.googleapis.com/v0/b/crm/o/images%252Fa.jpg?alt=media";
        let encoded = broken
            .replace('%', "%25")
            .replace('?', "%3F")
            .replace('=', "%3D");
        let uri = format!("/api/image-proxy?url={encoded}");
        let resp = app
            .router
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/jpeg");
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], JPEG);
    }

    #[tokio::test]
    async fn test_image_proxy_error_page_is_502() {
        let url = "https://storage.googleapis.com/bucket/x.jpg";
        let app = test_app(
            None,
            with_response(url, b"<?xml version='1.0'?><Error><Code>AccessDenied</Code></Error>", Some("application/xml")),
        )
        .await;
        let resp = app
            .router
            .oneshot(
                Request::get(format!("/api/image-proxy?url={url}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_image_proxy_unknown_bytes_keep_upstream_type() {
        let url = "https://storage.googleapis.com/bucket/notes.txt";
        let app = test_app(None, with_response(url, b"hello", Some("text/plain"))).await;
        let resp = app
            .router
            .oneshot(
                Request::get(format!("/api/image-proxy?url={url}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/plain");
    }

    #[tokio::test]
    async fn test_image_proxy_rejects_unlisted_host() {
        let app = test_app(None, MockFetcher::default()).await;
        let resp = app
            .router
            .clone()
            .oneshot(
                Request::get("/api/image-proxy?url=https://evil.example.com/x.jpg")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = app
            .router
            .oneshot(Request::get("/api/image-proxy").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_image_proxy_upstream_failure_is_502() {
        let app = test_app(None, MockFetcher::default()).await;
        let resp = app
            .router
            .oneshot(
                Request::get("/api/image-proxy?url=https://mmg.whatsapp.net/d/f/x.jpg")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_media_not_found_and_traversal() {
        let app = test_app(None, MockFetcher::default()).await;
        let resp = app
            .router
            .clone()
            .oneshot(Request::get("/media/images/x/2024/05/none.jpg").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = app
            .router
            .oneshot(Request::get("/media/a/../../etc/passwd").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_ne!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "ab"));
    }
}
