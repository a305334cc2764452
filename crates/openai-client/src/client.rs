//! Request dispatch over the weighted key pool
//!
//! One flow serves every endpoint: select a key, resolve the endpoint URL,
//! attach the bearer token and body, send, classify the result. A response
//! that condemns the key (quota exhausted, revoked) invalidates it in the
//! pool before the failure is surfaced, so later calls already draw from the
//! reduced set. Exactly one key is consumed per attempt; retrying is the
//! caller's decision and goes through a fresh selection.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use openai_pool::{ErrorPolicy, ExhaustionNotifier, KeyPool, LogNotifier, SelectedKey, Verdict};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::Config;
use crate::endpoint::{EndpointResolver, Operation};
use crate::entity::audio::{CreateAudioRequest, CreateAudioResponse};
use crate::entity::billing::{CreditGrantsResponse, SubscriptionResponse, UsageResponse};
use crate::entity::chat::{ChatCompletionRequest, ChatCompletionResponse};
use crate::entity::completions::{CompletionRequest, CompletionResponse};
use crate::entity::edit::{EditRequest, EditResponse};
use crate::entity::embedding::{EmbeddingRequest, EmbeddingResponse};
use crate::entity::file::{DeleteFileResponse, FileObject, ListFilesResponse};
use crate::entity::fine_tune::{
    CreateFineTuneRequest, DeleteFineTuneModelResponse, FineTune, ListFineTuneEventsResponse,
    ListFineTunesResponse,
};
use crate::entity::image::{
    CreateImageRequest, CreateImageResponse, CreateImageVariationRequest, ImageResponseFormat,
    ImageSize,
};
use crate::entity::model::{ListModelsResponse, Model};
use crate::entity::moderation::{ModerationRequest, ModerationResponse};
use crate::entity::user::UserResponse;
use crate::error::{Error, Result};
use crate::stream::{self, EventSink, StreamHandle};

/// Image edit/variation uploads must stay under this size.
const MAX_IMAGE_BYTES: usize = 4 * 1024 * 1024;

/// Body of one outbound request.
enum Payload {
    Json(String),
    Form(Form),
    /// POST with an empty body (cancel endpoints).
    Empty,
    /// No body at all (GET/DELETE).
    None,
}

/// Client for an OpenAI-compatible API, rotating over a weighted key pool.
pub struct OpenAiClient {
    http: reqwest::Client,
    pool: Arc<KeyPool>,
    resolver: EndpointResolver,
    policy: Arc<ErrorPolicy>,
    notifier: Arc<dyn ExhaustionNotifier>,
    request_timeout: Duration,
}

impl OpenAiClient {
    /// Build a client from configuration. The pool is seeded from the
    /// configured `(token, weight)` pairs; classification policy and
    /// exhaustion notifier start at their defaults and can be swapped with
    /// [`with_policy`](Self::with_policy) /
    /// [`with_notifier`](Self::with_notifier).
    pub fn new(config: &Config) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs));

        if let Some(proxy_config) = &config.proxy {
            let mut proxy = reqwest::Proxy::all(&proxy_config.url)
                .map_err(|e| Error::Init(format!("invalid proxy url: {e}")))?;
            if let (Some(username), Some(password)) =
                (&proxy_config.username, &proxy_config.password)
            {
                proxy = proxy.basic_auth(username, password);
            }
            builder = builder.proxy(proxy);
        }

        let http = builder.build().map_err(|e| Error::Init(e.to_string()))?;

        Ok(Self {
            http,
            pool: Arc::new(KeyPool::new(config.key_pairs())),
            resolver: EndpointResolver::new(config.domain.clone(), config.urls.clone()),
            policy: Arc::new(ErrorPolicy::default()),
            notifier: Arc::new(LogNotifier),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    /// Replace the classification policy.
    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Replace the exhaustion notifier.
    pub fn with_notifier(mut self, notifier: Arc<dyn ExhaustionNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// The shared key pool, for health surfaces and diagnostics.
    pub fn pool(&self) -> &Arc<KeyPool> {
        &self.pool
    }

    // --- endpoint surface ---

    pub async fn moderations(&self, request: &ModerationRequest) -> Result<ModerationResponse> {
        self.execute(Operation::Moderations, json_payload(request)?, &[])
            .await
    }

    #[deprecated(note = "legacy endpoint; prefer chat_completions")]
    pub async fn completions(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        self.execute(Operation::Completions, json_payload(request)?, &[])
            .await
    }

    #[deprecated(note = "legacy endpoint; prefer stream_chat_completions")]
    pub fn stream_completions(
        &self,
        mut request: CompletionRequest,
        sink: impl EventSink,
    ) -> Result<StreamHandle> {
        request.stream = Some(true);
        let body = serialize_body(&request)?;
        self.open_stream(Operation::Completions, body, sink)
    }

    pub async fn edits(&self, request: &EditRequest) -> Result<EditResponse> {
        self.execute(Operation::Edits, json_payload(request)?, &[])
            .await
    }

    pub async fn chat_completions(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse> {
        self.execute(Operation::ChatCompletions, json_payload(request)?, &[])
            .await
    }

    /// Open a streamed chat completion; `stream` is forced on before
    /// dispatch. Events arrive on `sink` until the terminal notification.
    pub fn stream_chat_completions(
        &self,
        mut request: ChatCompletionRequest,
        sink: impl EventSink,
    ) -> Result<StreamHandle> {
        request.stream = Some(true);
        let body = serialize_body(&request)?;
        self.open_stream(Operation::ChatCompletions, body, sink)
    }

    pub async fn models(&self) -> Result<ListModelsResponse> {
        self.execute(Operation::ListModels, Payload::None, &[]).await
    }

    pub async fn retrieve_model(&self, model_id: &str) -> Result<Model> {
        self.execute(Operation::RetrieveModel, Payload::None, &[model_id])
            .await
    }

    pub async fn embeddings(&self, request: &EmbeddingRequest) -> Result<EmbeddingResponse> {
        self.execute(Operation::Embeddings, json_payload(request)?, &[])
            .await
    }

    pub async fn list_files(&self) -> Result<ListFilesResponse> {
        self.execute(Operation::ListFiles, Payload::None, &[]).await
    }

    pub async fn upload_file(&self, file: &Path, purpose: &str) -> Result<FileObject> {
        let bytes = read_upload(file).await?;
        let form = Form::new()
            .text("purpose", purpose.to_string())
            .part("file", Part::bytes(bytes).file_name(file_name(file)));
        self.execute(Operation::UploadFile, Payload::Form(form), &[])
            .await
    }

    pub async fn delete_file(&self, file_id: &str) -> Result<DeleteFileResponse> {
        self.execute(Operation::DeleteFile, Payload::None, &[file_id])
            .await
    }

    pub async fn retrieve_file(&self, file_id: &str) -> Result<FileObject> {
        self.execute(Operation::RetrieveFile, Payload::None, &[file_id])
            .await
    }

    pub async fn create_fine_tune(&self, request: &CreateFineTuneRequest) -> Result<FineTune> {
        self.execute(Operation::CreateFineTune, json_payload(request)?, &[])
            .await
    }

    pub async fn list_fine_tunes(&self) -> Result<ListFineTunesResponse> {
        self.execute(Operation::ListFineTunes, Payload::None, &[])
            .await
    }

    pub async fn retrieve_fine_tune(&self, fine_tune_id: &str) -> Result<FineTune> {
        self.execute(Operation::RetrieveFineTune, Payload::None, &[fine_tune_id])
            .await
    }

    pub async fn cancel_fine_tune(&self, fine_tune_id: &str) -> Result<FineTune> {
        self.execute(Operation::CancelFineTune, Payload::Empty, &[fine_tune_id])
            .await
    }

    pub async fn list_fine_tune_events(
        &self,
        fine_tune_id: &str,
    ) -> Result<ListFineTuneEventsResponse> {
        self.execute(Operation::ListFineTuneEvents, Payload::None, &[fine_tune_id])
            .await
    }

    pub async fn delete_fine_tune_model(&self, model: &str) -> Result<DeleteFineTuneModelResponse> {
        self.execute(Operation::DeleteFineTuneModel, Payload::None, &[model])
            .await
    }

    pub async fn create_transcription(
        &self,
        file: &Path,
        request: &CreateAudioRequest,
    ) -> Result<CreateAudioResponse> {
        let payload = audio_payload(file, request).await?;
        self.execute(Operation::CreateTranscription, payload, &[])
            .await
    }

    pub async fn create_translation(
        &self,
        file: &Path,
        request: &CreateAudioRequest,
    ) -> Result<CreateAudioResponse> {
        let payload = audio_payload(file, request).await?;
        self.execute(Operation::CreateTranslation, payload, &[])
            .await
    }

    pub async fn create_image(&self, request: &CreateImageRequest) -> Result<CreateImageResponse> {
        self.execute(Operation::CreateImage, json_payload(request)?, &[])
            .await
    }

    /// Edit an image with a mask. Both files must be PNG and under 4 MB.
    pub async fn create_image_edit(
        &self,
        image: &Path,
        mask: &Path,
        request: &CreateImageRequest,
    ) -> Result<CreateImageResponse> {
        let mut form = Form::new()
            .part("image", png_part(image).await?)
            .part("mask", png_part(mask).await?)
            .text("prompt", request.prompt.clone());
        form = image_options(
            form,
            request.n,
            request.size,
            request.response_format,
            request.user.as_deref(),
        );
        self.execute(Operation::CreateImageEdit, Payload::Form(form), &[])
            .await
    }

    /// Generate variations of an image. The file must be PNG and under 4 MB.
    pub async fn create_image_variation(
        &self,
        image: &Path,
        request: &CreateImageVariationRequest,
    ) -> Result<CreateImageResponse> {
        let mut form = Form::new().part("image", png_part(image).await?);
        form = image_options(
            form,
            request.n,
            request.size,
            request.response_format,
            request.user.as_deref(),
        );
        self.execute(Operation::CreateImageVariation, Payload::Form(form), &[])
            .await
    }

    pub async fn billing_credit_grants(&self) -> Result<CreditGrantsResponse> {
        self.execute(Operation::BillingCreditGrants, Payload::None, &[])
            .await
    }

    pub async fn users(&self, organization_id: &str) -> Result<UserResponse> {
        self.execute(Operation::Users, Payload::None, &[organization_id])
            .await
    }

    pub async fn billing_subscription(&self) -> Result<SubscriptionResponse> {
        self.execute(Operation::BillingSubscription, Payload::None, &[])
            .await
    }

    pub async fn billing_usage(
        &self,
        start_date: &str,
        end_date: &str,
    ) -> Result<UsageResponse> {
        self.execute(Operation::BillingUsage, Payload::None, &[start_date, end_date])
            .await
    }

    // --- dispatch core ---

    /// Open a server-sent event stream for `operation`.
    ///
    /// Key selection and endpoint resolution failures are returned here,
    /// before any task is spawned; everything later reaches the sink.
    pub fn open_stream(
        &self,
        operation: Operation,
        body: String,
        sink: impl EventSink,
    ) -> Result<StreamHandle> {
        let key = self.select_key()?;
        let (method, url) = self.resolver.resolve(operation, &[])?;
        let request_id = request_id();
        debug!(
            request_id,
            operation = operation.name(),
            url = %url,
            key = %key.fingerprint(),
            "opening stream"
        );
        // No total timeout here: streams live until completion or cancel.
        let request = self
            .http
            .request(method, &url)
            .header(AUTHORIZATION, bearer(&key))
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/event-stream")
            .body(body);
        Ok(stream::spawn_relay(
            request,
            key.id(),
            Arc::clone(&self.pool),
            Arc::clone(&self.policy),
            request_id,
            sink,
        ))
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation: Operation,
        payload: Payload,
        vars: &[&str],
    ) -> Result<T> {
        let body = self.dispatch(operation, payload, vars).await?;
        serde_json::from_str(&body).map_err(|e| Error::Decode(e.to_string()))
    }

    /// Run one single-response call and return the raw success body.
    async fn dispatch(&self, operation: Operation, payload: Payload, vars: &[&str]) -> Result<String> {
        let key = self.select_key()?;
        let (method, url) = self.resolver.resolve(operation, vars)?;
        let request_id = request_id();
        debug!(
            request_id,
            operation = operation.name(),
            url = %url,
            key = %key.fingerprint(),
            "dispatching request"
        );

        let mut request = self
            .http
            .request(method, &url)
            .header(AUTHORIZATION, bearer(&key))
            .timeout(self.request_timeout);
        request = match payload {
            Payload::Json(body) => request
                .header(CONTENT_TYPE, "application/json")
                .body(body),
            Payload::Form(form) => request.multipart(form),
            Payload::Empty => request.body(String::new()),
            Payload::None => request,
        };

        let started = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                crate::metrics::record_transport_error(operation.name());
                warn!(request_id, error = %e, "transport failure");
                return Err(Error::Transport(e.to_string()));
            }
        };

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        crate::metrics::record_request(operation.name(), status, started.elapsed().as_secs_f64());

        match self.policy.classify(status, &body) {
            Verdict::Success => {
                debug!(request_id, status, "request succeeded");
                Ok(body)
            }
            verdict => {
                let invalidated = verdict == Verdict::Invalidate;
                // Invalidate before surfacing the error so a concurrent or
                // follow-up select() cannot hand out the condemned key.
                if invalidated {
                    self.pool.invalidate(key.id());
                }
                warn!(request_id, status, invalidated, "remote rejected request");
                Err(Error::RemoteRejected {
                    status,
                    body,
                    invalidated,
                })
            }
        }
    }

    /// Select a key or raise the exhaustion event and fail.
    fn select_key(&self) -> Result<SelectedKey> {
        self.pool.select().map_err(|e| {
            warn!(error = %e, "no usable api key");
            self.notifier.exhausted(&self.pool.invalidated());
            Error::NoApiKey
        })
    }
}

fn bearer(key: &SelectedKey) -> String {
    format!("Bearer {}", key.token())
}

fn request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().as_simple())
}

fn serialize_body<T: Serialize>(request: &T) -> Result<String> {
    serde_json::to_string(request)
        .map_err(|e| Error::InvalidRequest(format!("serializing request body: {e}")))
}

fn json_payload<T: Serialize>(request: &T) -> Result<Payload> {
    Ok(Payload::Json(serialize_body(request)?))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("file")
        .to_string()
}

async fn read_upload(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| Error::InvalidRequest(format!("reading upload file {}: {e}", path.display())))
}

/// Validated PNG multipart part for the image endpoints.
async fn png_part(path: &Path) -> Result<Part> {
    if !path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
    {
        return Err(Error::InvalidRequest(format!(
            "{} must be a png file",
            path.display()
        )));
    }
    let bytes = read_upload(path).await?;
    if bytes.len() >= MAX_IMAGE_BYTES {
        return Err(Error::InvalidRequest(format!(
            "{} must be smaller than 4MB",
            path.display()
        )));
    }
    Part::bytes(bytes)
        .file_name(file_name(path))
        .mime_str("image/png")
        .map_err(|e| Error::InvalidRequest(e.to_string()))
}

/// Apply the optional image form fields shared by edit and variation calls.
fn image_options(
    mut form: Form,
    n: Option<u32>,
    size: Option<ImageSize>,
    response_format: Option<ImageResponseFormat>,
    user: Option<&str>,
) -> Form {
    if let Some(n) = n {
        form = form.text("n", n.to_string());
    }
    if let Some(size) = size {
        form = form.text("size", size.as_str());
    }
    if let Some(format) = response_format {
        form = form.text("response_format", format.as_str());
    }
    if let Some(user) = user {
        form = form.text("user", user.to_string());
    }
    form
}

/// Multipart payload for the audio endpoints; optional fields are applied
/// only when present.
async fn audio_payload(file: &Path, request: &CreateAudioRequest) -> Result<Payload> {
    let bytes = read_upload(file).await?;
    let mut form = Form::new()
        .part("file", Part::bytes(bytes).file_name(file_name(file)))
        .text("model", request.model.clone());
    if let Some(prompt) = &request.prompt {
        form = form.text("prompt", prompt.clone());
    }
    if let Some(format) = &request.response_format {
        form = form.text("response_format", format.clone());
    }
    if let Some(temperature) = request.temperature {
        form = form.text("temperature", temperature.to_string());
    }
    if let Some(language) = &request.language {
        form = form.text("language", language.clone());
    }
    Ok(Payload::Form(form))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeyConfig;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    fn test_config(keys: &[(&str, u32)]) -> Config {
        Config {
            domain: "https://api.openai.com".into(),
            keys: keys
                .iter()
                .map(|(token, weight)| KeyConfig {
                    token: token.to_string(),
                    weight: *weight,
                })
                .collect(),
            urls: BTreeMap::new(),
            connect_timeout_secs: 1,
            request_timeout_secs: 1,
            proxy: None,
        }
    }

    #[derive(Default)]
    struct RecordingNotifier(Mutex<Vec<Vec<String>>>);

    impl ExhaustionNotifier for RecordingNotifier {
        fn exhausted(&self, invalidated: &[String]) {
            self.0.lock().unwrap().push(invalidated.to_vec());
        }
    }

    #[tokio::test]
    async fn empty_pool_fails_fast_and_notifies() {
        let notifier = Arc::new(RecordingNotifier::default());
        let client = OpenAiClient::new(&test_config(&[]))
            .unwrap()
            .with_notifier(notifier.clone());

        let err = client.models().await.unwrap_err();
        assert!(matches!(err, Error::NoApiKey));
        assert_eq!(notifier.0.lock().unwrap().len(), 1, "notifier fires once per failed call");
    }

    #[tokio::test]
    async fn png_part_rejects_wrong_extension() {
        let err = png_part(Path::new("/tmp/not-a-png.jpg")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert!(err.to_string().contains("must be a png file"));
    }

    #[tokio::test]
    async fn png_part_rejects_oversized_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.png");
        std::fs::write(&path, vec![0u8; MAX_IMAGE_BYTES]).unwrap();

        let err = png_part(&path).await.unwrap_err();
        assert!(err.to_string().contains("smaller than 4MB"));
    }

    #[test]
    fn file_name_falls_back_for_pathless_input() {
        assert_eq!(file_name(Path::new("/tmp/audio.mp3")), "audio.mp3");
        assert_eq!(file_name(Path::new("/")), "file");
    }

    #[test]
    fn request_ids_carry_the_req_prefix() {
        let id = request_id();
        assert!(id.starts_with("req_"), "got: {id}");
        assert_ne!(request_id(), id);
    }
}
