//! Backend that forwards to another farm over HTTP.
//!
//! Each operation calls the matching route on the upstream farm and decodes
//! its envelope. Upstream error envelopes come back as
//! [`BackendError::Rejected`] carrying the upstream code, so a farm in front
//! of another farm answers with the same codes. Transport failures are
//! [`BackendError::Failed`].

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Url};
use serde_json::{json, Map, Value};

use super::{Backend, BackendError, BackendResult, Behbble, CallOptions, ShepardReply};
use crate::error::ErrorCode;

/// Forwards every backend operation to an upstream farm.
#[derive(Debug, Clone)]
pub struct RemoteBackend {
    base: Url,
    client: Client,
}

impl RemoteBackend {
    /// Create a backend for the farm at `base_url`, e.g. `http://10.0.0.2:8080`.
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_client(base_url: &str, client: Client) -> anyhow::Result<Self> {
        let base = Url::parse(base_url)
            .with_context(|| format!("Invalid upstream farm URL {base_url:?}"))?;
        if base.cannot_be_a_base() {
            bail!("Upstream farm URL {base_url:?} cannot have a path");
        }
        Ok(Self { base, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn fetch(&self, request: RequestBuilder, operation: &str) -> BackendResult<Value> {
        let response = request
            .send()
            .await
            .with_context(|| format!("{operation} request to upstream farm failed"))?;
        let body = response
            .json::<Value>()
            .await
            .with_context(|| format!("Upstream farm sent invalid JSON for {operation}"))?;
        Ok(body)
    }

    async fn fetch_fields(
        &self,
        request: RequestBuilder,
        operation: &str,
    ) -> BackendResult<Map<String, Value>> {
        let body = self.fetch(request, operation).await?;
        envelope_fields(body)
    }
}

/// Payload of a success envelope, or the rejection an error envelope carries.
fn envelope_fields(body: Value) -> BackendResult<Map<String, Value>> {
    let Value::Object(mut fields) = body else {
        return Err(anyhow!("Upstream farm sent a non-object reply").into());
    };

    if let Some(err) = fields.remove("err") {
        let message = match err {
            Value::String(message) => message,
            other => other.to_string(),
        };
        let code = fields
            .remove("code")
            .and_then(|code| serde_json::from_value::<ErrorCode>(code).ok());
        return Err(BackendError::Rejected { message, code });
    }

    fields.remove("success");
    Ok(fields)
}

/// `choices` wins over `shepard`; a `choices` value that is not a list is a
/// malformed reply.
fn shepard_reply(mut fields: Map<String, Value>) -> BackendResult<ShepardReply> {
    match fields.remove("choices") {
        Some(Value::Array(choices)) => Ok(ShepardReply::Choices(choices)),
        Some(other) => Err(anyhow!("Upstream farm sent non-list choices: {other}").into()),
        None => Ok(ShepardReply::Shepard(
            fields.remove("shepard").unwrap_or(Value::Null),
        )),
    }
}

#[async_trait]
impl Backend for RemoteBackend {
    async fn info(&self) -> BackendResult<Map<String, Value>> {
        let request = self.client.get(self.endpoint(&["info"]));
        self.fetch_fields(request, "info").await
    }

    async fn status(&self) -> BackendResult<Map<String, Value>> {
        let request = self.client.get(self.endpoint(&["status"]));
        self.fetch_fields(request, "status").await
    }

    async fn call_shepard(
        &self,
        query: &str,
        options: CallOptions,
    ) -> BackendResult<Option<ShepardReply>> {
        let request = self
            .client
            .post(self.endpoint(&["call_shepard"]))
            .json(&json!({ "query": query, "isChoice": options.is_choice }));
        let fields = self.fetch_fields(request, "call_shepard").await?;
        shepard_reply(fields).map(Some)
    }

    async fn get_shepard_behbbles(&self, shepard_id: &str) -> BackendResult<Option<Vec<Value>>> {
        let request = self.client.get(self.endpoint(&["shepard", shepard_id]));
        let mut fields = self.fetch_fields(request, "get_shepard_behbbles").await?;

        match fields.remove("behbbles") {
            Some(Value::Array(behbbles)) => Ok(Some(behbbles)),
            _ => Err(anyhow!("Upstream farm reply has no behbbles list").into()),
        }
    }

    async fn get_behbble(
        &self,
        shepard_id: &str,
        behbble_id: &str,
    ) -> BackendResult<Option<Behbble>> {
        let response = self
            .client
            .get(self.endpoint(&["behbble", shepard_id, behbble_id]))
            .send()
            .await
            .context("get_behbble request to upstream farm failed")?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let body = response
            .bytes()
            .await
            .context("Failed to read behbble from upstream farm")?;

        if content_type.starts_with("application/json") {
            if let Ok(value @ Value::Object(_)) = serde_json::from_slice::<Value>(&body) {
                let is_envelope = value.get("err").is_some()
                    || (value.get("success") == Some(&Value::Bool(true))
                        && value.get("behbble").is_some());
                if is_envelope {
                    let mut fields = envelope_fields(value)?;
                    let behbble = fields.remove("behbble").unwrap_or(Value::Null);
                    return Ok(Some(Behbble::Json(behbble)));
                }
            }
        }

        Ok(Some(Behbble::Raw { content_type, body }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use tokio::net::TcpListener;

    use super::*;
    use crate::server::{app_router, AppState, FarmConfig};

    /// Upstream backend with fixed answers.
    struct Upstream;

    #[async_trait]
    impl Backend for Upstream {
        async fn info(&self) -> BackendResult<Map<String, Value>> {
            let mut info = Map::new();
            info.insert("name".to_string(), json!("Upstream Farm"));
            Ok(info)
        }

        async fn status(&self) -> BackendResult<Map<String, Value>> {
            let mut status = Map::new();
            status.insert("capacity".to_string(), json!(2));
            status.insert("queue".to_string(), json!(7));
            Ok(status)
        }

        async fn call_shepard(
            &self,
            query: &str,
            options: CallOptions,
        ) -> BackendResult<Option<ShepardReply>> {
            if query == "nothing" {
                return Ok(None);
            }
            if options.is_choice {
                Ok(Some(ShepardReply::Shepard(json!(format!("picked:{query}")))))
            } else {
                Ok(Some(ShepardReply::Choices(vec![json!(query)])))
            }
        }

        async fn get_shepard_behbbles(&self, shepard_id: &str) -> BackendResult<Option<Vec<Value>>> {
            if shepard_id == "gone" {
                return Err(BackendError::rejected_with(
                    "no such shepard",
                    ErrorCode::ShepardNotFound,
                ));
            }
            Ok(Some(vec![json!({"shepard": shepard_id})]))
        }

        async fn get_behbble(
            &self,
            shepard_id: &str,
            behbble_id: &str,
        ) -> BackendResult<Option<Behbble>> {
            match behbble_id {
                "json" => Ok(Some(Behbble::Json(json!({"of": shepard_id})))),
                "raw" => Ok(Some(Behbble::Raw {
                    content_type: "text/plain; charset=utf-8".to_string(),
                    body: Bytes::from_static(b"raw behbble"),
                })),
                _ => Ok(None),
            }
        }
    }

    async fn spawn_upstream() -> RemoteBackend {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = AppState::new(Arc::new(Upstream), FarmConfig::default());
        tokio::spawn(async move {
            axum::serve(listener, app_router(state)).await.unwrap();
        });
        RemoteBackend::new(&format!("http://{addr}/")).unwrap()
    }

    #[test]
    fn test_rejects_bad_urls() {
        assert!(RemoteBackend::new("not a url").is_err());
        assert!(RemoteBackend::new("mailto:farm@example.com").is_err());
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let backend = RemoteBackend::new("http://farm.local:8080/api/").unwrap();
        assert_eq!(
            backend.endpoint(&["behbble", "s 1", "b2"]).as_str(),
            "http://farm.local:8080/api/behbble/s%201/b2"
        );
    }

    #[test]
    fn test_envelope_fields_decoding() {
        let fields = envelope_fields(json!({"success": true, "shepard": "x"})).unwrap();
        assert_eq!(fields.get("shepard"), Some(&json!("x")));
        assert!(fields.get("success").is_none());

        let err = envelope_fields(json!({"err": "busy", "code": 7})).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ReachedCapacity);
        assert_eq!(err.description(), "busy");

        let err = envelope_fields(json!({"err": "odd", "code": "weird"})).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CustomError);

        let err = envelope_fields(json!([1])).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnexpectedError);
    }

    #[tokio::test]
    async fn test_forwards_info_and_status() {
        let backend = spawn_upstream().await;

        let info = backend.info().await.unwrap();
        assert_eq!(info["name"], "Upstream Farm");
        assert_eq!(info["is_farm"], true);

        let status = backend.status().await.unwrap();
        assert_eq!(status["capacity"], 2);
        assert_eq!(status["queue"], 7);
    }

    #[tokio::test]
    async fn test_forwards_call_shepard() {
        let backend = spawn_upstream().await;

        let reply = backend
            .call_shepard("hello", CallOptions { is_choice: false })
            .await
            .unwrap();
        assert_eq!(reply, Some(ShepardReply::Choices(vec![json!("hello")])));

        let reply = backend
            .call_shepard("hello", CallOptions { is_choice: true })
            .await
            .unwrap();
        assert_eq!(reply, Some(ShepardReply::Shepard(json!("picked:hello"))));

        let err = backend
            .call_shepard("nothing", CallOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidShepardQuery);
    }

    #[tokio::test]
    async fn test_forwards_lookups() {
        let backend = spawn_upstream().await;

        let behbbles = backend.get_shepard_behbbles("s1").await.unwrap();
        assert_eq!(behbbles, Some(vec![json!({"shepard": "s1"})]));

        let err = backend.get_shepard_behbbles("gone").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ShepardNotFound);

        let behbble = backend.get_behbble("s1", "json").await.unwrap();
        assert_eq!(behbble, Some(Behbble::Json(json!({"of": "s1"}))));

        let behbble = backend.get_behbble("s1", "raw").await.unwrap();
        assert_eq!(
            behbble,
            Some(Behbble::Raw {
                content_type: "text/plain; charset=utf-8".to_string(),
                body: Bytes::from_static(b"raw behbble"),
            })
        );

        let err = backend.get_behbble("s1", "other").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidShepardId);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let backend = RemoteBackend::new(&format!("http://{addr}")).unwrap();
        let err = backend.status().await.unwrap_err();
        assert!(matches!(err, BackendError::Failed(_)));
        assert_eq!(err.code(), ErrorCode::UnexpectedError);
    }

    #[test]
    fn test_shepard_reply_decoding() {
        let fields = |value: Value| value.as_object().cloned().unwrap();

        let reply = shepard_reply(fields(json!({"choices": [1, 2], "shepard": "s"}))).unwrap();
        assert_eq!(reply, ShepardReply::Choices(vec![json!(1), json!(2)]));

        let reply = shepard_reply(fields(json!({"shepard": {"id": "s1"}}))).unwrap();
        assert_eq!(reply, ShepardReply::Shepard(json!({"id": "s1"})));

        let reply = shepard_reply(Map::new()).unwrap();
        assert_eq!(reply, ShepardReply::Shepard(Value::Null));

        for choices in [json!(null), json!("one"), json!({"a": 1})] {
            let err = shepard_reply(fields(json!({ "choices": choices }))).unwrap_err();
            assert!(matches!(err, BackendError::Failed(_)));
            assert_eq!(err.code(), ErrorCode::UnexpectedError);
        }
    }
}
