//! Evolution API client.
//!
//! Evolution keeps the WhatsApp session keys, so it can decrypt `.enc` media
//! we cannot. All calls authenticate with the `apikey` header.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};
use wamedia_core::{
    config::EvolutionConfig,
    error::WamediaError,
    traits::{DecryptedMedia, MediaDecrypter},
};

/// Decryption of large videos can take a while on the Evolution side.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct EvolutionClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    convert_to_mp4: bool,
}

/// Instance connection state as reported by `/instance/connectionState`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    pub instance: String,
    /// `open`, `connecting`, `close`, ...
    pub state: String,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        self.state == "open"
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Base64Response {
    #[serde(default)]
    base64: Option<String>,
    #[serde(default)]
    mimetype: Option<String>,
    #[serde(default)]
    file_name: Option<String>,
}

impl EvolutionClient {
    pub fn new(api_url: &str, api_key: &str, convert_to_mp4: bool) -> Result<Self, WamediaError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| WamediaError::Evolution(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            convert_to_mp4,
        })
    }

    /// `None` when Evolution access is disabled.
    pub fn from_config(config: &EvolutionConfig) -> Result<Option<Self>, WamediaError> {
        if !config.enabled {
            return Ok(None);
        }
        Self::new(&config.api_url, &config.api_key, config.convert_to_mp4).map(Some)
    }

    /// `POST /chat/getBase64FromMediaMessage/{instance}`.
    pub async fn get_base64_from_media_message(
        &self,
        instance: &str,
        message_id: &str,
        convert_to_mp4: bool,
    ) -> Result<DecryptedMedia, WamediaError> {
        let url = format!(
            "{}/chat/getBase64FromMediaMessage/{}",
            self.api_url,
            instance_segment(instance)?
        );
        let body = json!({
            "message": { "key": { "id": message_id } },
            "convertToMp4": convert_to_mp4,
        });
        debug!("evolution: POST {url} message={message_id}");

        let resp = self
            .client
            .post(&url)
            .header("apikey", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| WamediaError::Evolution(format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(WamediaError::Evolution(format!(
                "getBase64FromMediaMessage returned {status}: {}",
                truncate(&text, 300)
            )));
        }

        let parsed: Base64Response = resp
            .json()
            .await
            .map_err(|e| WamediaError::Evolution(format!("failed to parse response: {e}")))?;
        decrypted_from_response(parsed)
    }

    /// `GET /instance/connectionState/{instance}`.
    pub async fn connection_state(&self, instance: &str) -> Result<ConnectionState, WamediaError> {
        let url = format!(
            "{}/instance/connectionState/{}",
            self.api_url,
            instance_segment(instance)?
        );
        let resp = self
            .client
            .get(&url)
            .header("apikey", &self.api_key)
            .send()
            .await
            .map_err(|e| WamediaError::Evolution(format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            warn!("evolution: connectionState for {instance} returned {status}");
            return Err(WamediaError::Evolution(format!(
                "connectionState returned {status}: {}",
                truncate(&text, 300)
            )));
        }

        let value: Value = resp
            .json()
            .await
            .map_err(|e| WamediaError::Evolution(format!("failed to parse response: {e}")))?;
        parse_connection_state(instance, &value)
    }
}

#[async_trait]
impl MediaDecrypter for EvolutionClient {
    async fn decrypt_media(
        &self,
        instance: &str,
        message_id: &str,
    ) -> Result<DecryptedMedia, WamediaError> {
        self.get_base64_from_media_message(instance, message_id, self.convert_to_mp4)
            .await
    }
}

fn decrypted_from_response(parsed: Base64Response) -> Result<DecryptedMedia, WamediaError> {
    let base64 = parsed
        .base64
        .map(|b| {
            // Some Evolution builds return a full data-URI.
            match b.split_once(";base64,") {
                Some((head, data)) if head.starts_with("data:") => data.trim().to_string(),
                _ => b.trim().to_string(),
            }
        })
        .filter(|b| !b.is_empty())
        .ok_or_else(|| WamediaError::Evolution("response has no base64 field".into()))?;

    Ok(DecryptedMedia {
        base64,
        mimetype: parsed.mimetype.filter(|m| !m.is_empty()),
        file_name: parsed.file_name.filter(|f| !f.is_empty()),
    })
}

/// v2 nests the state under `instance`; v1 returns it at the top level.
fn parse_connection_state(instance: &str, value: &Value) -> Result<ConnectionState, WamediaError> {
    let state = value["instance"]["state"]
        .as_str()
        .or_else(|| value["state"].as_str())
        .ok_or_else(|| WamediaError::Evolution("connectionState response has no state".into()))?;
    let name = value["instance"]["instanceName"]
        .as_str()
        .unwrap_or(instance);
    Ok(ConnectionState {
        instance: name.to_string(),
        state: state.to_string(),
    })
}

/// Instance names come from webhook payloads and must stay one path segment.
fn instance_segment(instance: &str) -> Result<String, WamediaError> {
    if instance.is_empty() || instance == "." || instance == ".." {
        return Err(WamediaError::Evolution(format!(
            "invalid instance name '{instance}'"
        )));
    }
    Ok(urlencoding::encode(instance).into_owned())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Path,
        http::{HeaderMap, StatusCode, Uri},
        routing::{get, post},
        Json, Router,
    };
    use std::sync::{Arc, Mutex};

    fn response(v: Value) -> Base64Response {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_decrypted_plain_base64() {
        let m = decrypted_from_response(response(json!({
            "mediaType": "audioMessage",
            "mimetype": "audio/ogg; codecs=opus",
            "base64": "T2dnUw=="
        })))
        .unwrap();
        assert_eq!(m.base64, "T2dnUw==");
        assert_eq!(m.mimetype.as_deref(), Some("audio/ogg; codecs=opus"));
        assert!(m.file_name.is_none());
    }

    #[test]
    fn test_decrypted_data_uri_is_stripped() {
        let m = decrypted_from_response(response(json!({
            "base64": "data:image/jpeg;base64,/9j/4A==",
            "fileName": "foto.jpg"
        })))
        .unwrap();
        assert_eq!(m.base64, "/9j/4A==");
        assert_eq!(m.file_name.as_deref(), Some("foto.jpg"));
    }

    #[test]
    fn test_decrypted_missing_base64_is_error() {
        assert!(decrypted_from_response(response(json!({ "mimetype": "image/jpeg" }))).is_err());
        assert!(decrypted_from_response(response(json!({ "base64": "" }))).is_err());
    }

    #[test]
    fn test_connection_state_shapes() {
        let v2 = json!({ "instance": { "instanceName": "vendas", "state": "open" } });
        let s = parse_connection_state("vendas", &v2).unwrap();
        assert!(s.is_open());

        let v1 = json!({ "state": "connecting" });
        let s = parse_connection_state("suporte", &v1).unwrap();
        assert_eq!(s.instance, "suporte");
        assert!(!s.is_open());

        assert!(parse_connection_state("x", &json!({})).is_err());
    }

    #[test]
    fn test_from_config_disabled() {
        let cfg = EvolutionConfig::default();
        assert!(EvolutionClient::from_config(&cfg).unwrap().is_none());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("áéíóú", 2), "áé");
        assert_eq!(truncate("ok", 10), "ok");
    }

    /// Minimal stand-in for the two Evolution endpoints we call.
    async fn spawn_mock() -> String {
        async fn get_base64(
            Path(instance): Path<String>,
            headers: HeaderMap,
            Json(body): Json<Value>,
        ) -> Result<Json<Value>, StatusCode> {
            if headers.get("apikey").and_then(|v| v.to_str().ok()) != Some("secret") {
                return Err(StatusCode::UNAUTHORIZED);
            }
            if instance != "vendas" || body["message"]["key"]["id"] != "3EB0A1" {
                return Err(StatusCode::NOT_FOUND);
            }
            Ok(Json(json!({
                "mimetype": "image/jpeg",
                "base64": "/9j/4A==",
                "convertToMp4": body["convertToMp4"],
            })))
        }

        async fn state(Path(instance): Path<String>) -> Json<Value> {
            Json(json!({ "instance": { "instanceName": instance, "state": "open" } }))
        }

        let app = Router::new()
            .route("/chat/getBase64FromMediaMessage/{instance}", post(get_base64))
            .route("/instance/connectionState/{instance}", get(state));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn test_client_against_mock_server() {
        let base = spawn_mock().await;
        let client = EvolutionClient::new(&base, "secret", false).unwrap();

        let media = client.decrypt_media("vendas", "3EB0A1").await.unwrap();
        assert_eq!(media.base64, "/9j/4A==");
        assert_eq!(media.mimetype.as_deref(), Some("image/jpeg"));

        let err = client.decrypt_media("vendas", "missing").await.unwrap_err();
        assert!(err.to_string().contains("404"));

        let state = client.connection_state("vendas").await.unwrap();
        assert!(state.is_open());
        assert_eq!(state.instance, "vendas");
    }

    #[test]
    fn test_instance_segment_is_encoded() {
        assert_eq!(instance_segment("vendas").unwrap(), "vendas");
        assert_eq!(instance_segment("loja 2").unwrap(), "loja%202");
        assert_eq!(
            instance_segment("../../instance/delete/vendas?x=").unwrap(),
            "..%2F..%2Finstance%2Fdelete%2Fvendas%3Fx%3D"
        );
        assert!(instance_segment("..").is_err());
        assert!(instance_segment(".").is_err());
        assert!(instance_segment("").is_err());
    }

    #[tokio::test]
    async fn test_instance_cannot_escape_endpoint_path() {
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let recorder = seen.clone();
        let app = Router::new().fallback(move |uri: Uri| {
            let recorder = recorder.clone();
            async move {
                recorder.lock().unwrap().push(uri.path().to_string());
                StatusCode::NOT_FOUND
            }
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = EvolutionClient::new(&format!("http://{addr}"), "secret", false).unwrap();
        let err = client
            .decrypt_media("../../instance/delete/vendas?x=", "3EB0A1")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("404"));
        assert!(client.connection_state("..").await.is_err());

        let seen = seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec!["/chat/getBase64FromMediaMessage/..%2F..%2Finstance%2Fdelete%2Fvendas%3Fx%3D"]
        );
    }

    #[tokio::test]
    async fn test_client_sends_apikey() {
        let base = spawn_mock().await;
        let client = EvolutionClient::new(&base, "wrong", false).unwrap();
        let err = client.decrypt_media("vendas", "3EB0A1").await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}
