use std::path::Path;
use std::sync::Arc;

use adgen_core::{CandidateId, ClientError, Direction, JobId, JobKind, PollSnapshot};
use adgen_logging::{adgen_debug, adgen_warn};
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use url::Url;

use crate::backend::{
    AssetStore, ByteStream, DisposalAcker, EntitlementSource, EventSource, JobBackend,
};
use crate::types::{AckRequest, EntitlementResponse, PollResponse, StartRequest, StartResponse};
use crate::{AssetSource, ClientSettings, CredentialProvider, EntitlementInfo, UploadedAsset};

/// reqwest client for the generation service.
///
/// Every call reads the bearer token from the injected [`CredentialProvider`]
/// and fails with [`ClientError::Unauthenticated`] before sending anything
/// when there is none.
#[derive(Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    settings: ClientSettings,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpApi {
    pub fn new(
        settings: ClientSettings,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ClientError> {
        // No client-wide timeout: it would cut long-lived progress streams.
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|err| ClientError::protocol(format!("http client setup failed: {err}")))?;
        Ok(Self {
            client,
            settings,
            credentials,
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        let raw = format!("{}/{}", self.settings.base_url.trim_end_matches('/'), path);
        Url::parse(&raw).map_err(|err| ClientError::validation("base_url", err.to_string()))
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        let token = self.credentials.require_token()?;
        Ok(request.bearer_auth(token))
    }

    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = self
            .authorized(request)?
            .timeout(self.settings.request_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = check_status(response).await?;
        let body = response.text().await.map_err(map_reqwest_error)?;
        serde_json::from_str(&body)
            .map_err(|err| ClientError::protocol(format!("undecodable response body: {err}")))
    }

    async fn call_without_body(&self, request: RequestBuilder) -> Result<(), ClientError> {
        let response = self
            .authorized(request)?
            .timeout(self.settings.request_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        check_status(response).await.map(|_| ())
    }
}

#[async_trait::async_trait]
impl JobBackend for HttpApi {
    async fn start(&self, kind: JobKind, parameters: &Value) -> Result<JobId, ClientError> {
        let url = self.endpoint("jobs")?;
        let body = StartRequest { kind, parameters };
        let response: StartResponse = self.call(self.client.post(url).json(&body)).await?;
        adgen_debug!("started {kind} job {}", response.job_id);
        Ok(response.job_id)
    }

    async fn poll(&self, job_id: &JobId) -> Result<PollSnapshot, ClientError> {
        let url = self.endpoint(&format!("jobs/{}", job_id.as_str()))?;
        let response: PollResponse = self.call(self.client.get(url)).await?;
        Ok(response.into())
    }
}

#[async_trait::async_trait]
impl EventSource for HttpApi {
    async fn open(&self, kind: JobKind, parameters: &Value) -> Result<ByteStream, ClientError> {
        let url = self.endpoint(&format!("stream/{}", kind.wire_name()))?;
        let payload = serde_json::to_string(parameters)
            .map_err(|err| ClientError::validation("parameters", err.to_string()))?;
        let request = self
            .client
            .get(url)
            .query(&[("payload", payload)])
            .header(ACCEPT, "text/event-stream");
        let response = self
            .authorized(request)?
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = check_status(response).await?;
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(map_reqwest_error))
            .boxed())
    }
}

#[async_trait::async_trait]
impl DisposalAcker for HttpApi {
    async fn acknowledge(
        &self,
        candidate_id: &CandidateId,
        direction: Direction,
    ) -> Result<(), ClientError> {
        let url = self.endpoint("candidates/ack")?;
        let body = AckRequest {
            item_id: candidate_id,
            action: direction,
        };
        self.call_without_body(self.client.post(url).json(&body))
            .await
            .map_err(|err| match err {
                ClientError::Unauthenticated => err,
                other => {
                    adgen_warn!("ack for {candidate_id} failed: {other}");
                    ClientError::DisposalAckFailure {
                        message: other.to_string(),
                    }
                }
            })
    }
}

#[async_trait::async_trait]
impl EntitlementSource for HttpApi {
    async fn entitlement(&self) -> Result<EntitlementInfo, ClientError> {
        let url = self.endpoint("billing/entitlement")?;
        let response: EntitlementResponse = self.call(self.client.get(url)).await?;
        Ok(response.into())
    }
}

#[async_trait::async_trait]
impl AssetStore for HttpApi {
    async fn upload(
        &self,
        source: AssetSource,
        folder: &str,
    ) -> Result<UploadedAsset, ClientError> {
        let url = self.endpoint("assets")?;
        let request = match source {
            AssetSource::File(path) => {
                let form = file_form(&path, folder).await?;
                self.client.post(url).multipart(form)
            }
            AssetSource::Url(remote) => {
                let parsed = Url::parse(remote.trim())
                    .map_err(|err| ClientError::validation("url", err.to_string()))?;
                self.client
                    .post(url)
                    .json(&json!({ "url": parsed.as_str(), "folder": folder }))
            }
        };
        self.call(request).await
    }
}

async fn file_form(path: &Path, folder: &str) -> Result<Form, ClientError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|err| ClientError::validation("file", format!("{}: {err}", path.display())))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    Ok(Form::new()
        .text("folder", folder.to_string())
        .part("file", Part::bytes(bytes).file_name(file_name)))
}

/// Maps a non-success status onto the client error taxonomy.
async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(error_for_status(status, &body))
}

pub(crate) fn error_for_status(status: StatusCode, body: &str) -> ClientError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|value| {
            ["message", "error", "detail"]
                .iter()
                .find_map(|key| value.get(*key).and_then(Value::as_str))
        })
        .map(ToOwned::to_owned)
        .or_else(|| Some(body.trim().to_string()).filter(|text| !text.is_empty()))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });

    match status.as_u16() {
        401 | 403 => ClientError::Unauthenticated,
        402 => ClientError::QuotaExceeded { message },
        400 | 422 => {
            let field = parsed
                .as_ref()
                .and_then(|value| value.get("field"))
                .and_then(Value::as_str)
                .unwrap_or("parameters");
            ClientError::validation(field, message)
        }
        408 | 429 | 500..=599 => ClientError::transient(format!("{status}: {message}")),
        code => ClientError::Rejected {
            status: code,
            message,
        },
    }
}

fn map_reqwest_error(err: reqwest::Error) -> ClientError {
    if err.is_builder() {
        return ClientError::validation("request", err.to_string());
    }
    if err.is_decode() {
        return ClientError::protocol(err.to_string());
    }
    // Timeouts, refused connections and truncated bodies all retry.
    ClientError::transient(err.to_string())
}
