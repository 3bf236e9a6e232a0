//! Live token streaming from a provider endpoint.
//!
//! [`TokenStreamService::stream`] spawns one pump task per call. The pump
//! posts the prompt, reads newline-delimited JSON tokens and forwards them
//! over a queue that the caller drains as a [`TokenStream`]. The pump is the
//! only writer: it ends the stream exactly once, optionally with a terminal
//! [`StreamError`], after recording latency and request status.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use talewright_config::StreamingConfig;
use talewright_core::{
    CancellationToken, HttpRequest, HttpTransport, StreamError, StreamErrorClass, TransportError,
};
use talewright_telemetry::{MetricsSink, RequestStatus};
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, UnboundedReceiverStream};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Provider error bodies are cut to this many characters.
const MAX_ERROR_DETAILS: usize = 512;

pub type TokenStream = BoxStream<'static, Result<StreamedToken, StreamError>>;

/// The prompt as it goes on the wire: `{prompt, promptId, metadata}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamPrompt {
    pub prompt: String,
    pub prompt_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

impl StreamPrompt {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            prompt_id: Uuid::new_v4(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamedToken {
    pub content: String,
    pub is_final: bool,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenPayload {
    #[serde(default, alias = "Content")]
    content: Option<String>,
    #[serde(default, alias = "IsFinal", alias = "is_final")]
    is_final: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueCapacity {
    Bounded(usize),
    Unbounded,
}

impl Default for QueueCapacity {
    fn default() -> Self {
        Self::Bounded(256)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingPolicy {
    /// Budget for provider I/O; time spent waiting on the consumer is not
    /// counted. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    pub queue: QueueCapacity,
}

impl Default for StreamingPolicy {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            queue: QueueCapacity::default(),
        }
    }
}

impl StreamingPolicy {
    /// A zero `timeout_secs` disables the timeout.
    pub fn from_config(config: &StreamingConfig) -> Self {
        Self {
            timeout: (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs)),
            queue: if config.unbounded_queue {
                QueueCapacity::Unbounded
            } else {
                QueueCapacity::Bounded(config.queue_capacity)
            },
        }
    }
}

/// Where and how to send one streaming request.
#[derive(Debug, Clone)]
pub struct StreamContext {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub headers: Vec<(String, String)>,
    pub policy: StreamingPolicy,
    pub trace_id: String,
    pub request_id: String,
}

impl StreamContext {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            headers: Vec::new(),
            policy: StreamingPolicy::default(),
            trace_id: Uuid::new_v4().to_string(),
            request_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_policy(mut self, policy: StreamingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }
}

/// Streams tokens for prompts, reporting each call to a [`MetricsSink`].
pub struct TokenStreamService {
    transport: Arc<dyn HttpTransport>,
    metrics: Arc<dyn MetricsSink>,
    provider: String,
}

impl TokenStreamService {
    pub fn new(transport: Arc<dyn HttpTransport>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            transport,
            metrics,
            provider: "stream".into(),
        }
    }

    /// Name under which metrics are recorded.
    pub fn with_provider_name(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Start streaming. Must be called inside a tokio runtime.
    pub fn stream(
        &self,
        prompt: StreamPrompt,
        context: StreamContext,
        cancel: CancellationToken,
    ) -> TokenStream {
        let (tx, stream) = token_channel(context.policy.queue);
        let pump = Pump {
            transport: self.transport.clone(),
            metrics: self.metrics.clone(),
            provider: self.provider.clone(),
            tx,
        };
        tokio::spawn(pump.run(prompt, context, cancel));
        stream
    }
}

type TokenItem = Result<StreamedToken, StreamError>;

enum TokenSender {
    Bounded(mpsc::Sender<TokenItem>),
    Unbounded(mpsc::UnboundedSender<TokenItem>),
}

impl TokenSender {
    /// False once the receiver is gone.
    async fn send(&self, item: TokenItem) -> bool {
        match self {
            Self::Bounded(tx) => tx.send(item).await.is_ok(),
            Self::Unbounded(tx) => tx.send(item).is_ok(),
        }
    }

    /// Hand a token to the consumer. Waiting for queue space gives way to
    /// `cancel`.
    async fn deliver(
        &self,
        token: StreamedToken,
        cancel: &CancellationToken,
    ) -> Result<(), StreamError> {
        let delivered = match self {
            Self::Bounded(tx) => tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StreamError::Canceled),
                sent = tx.send(Ok(token)) => sent.is_ok(),
            },
            Self::Unbounded(tx) => tx.send(Ok(token)).is_ok(),
        };
        if delivered {
            Ok(())
        } else {
            Err(StreamError::Canceled)
        }
    }
}

/// Time left for provider I/O. Waiting on the consumer is not charged.
struct IoBudget {
    remaining: Option<Duration>,
}

impl IoBudget {
    fn new(limit: Option<Duration>) -> Self {
        Self { remaining: limit }
    }

    async fn spend<F: Future>(&mut self, io: F) -> Result<F::Output, StreamError> {
        let Some(remaining) = self.remaining else {
            return Ok(io.await);
        };
        let started = tokio::time::Instant::now();
        let output = tokio::time::timeout(remaining, io).await.map_err(|_| {
            StreamError::provider(StreamErrorClass::NetworkTimeout, "Provider call timed out")
        })?;
        self.remaining = Some(remaining.saturating_sub(started.elapsed()));
        Ok(output)
    }
}

fn token_channel(queue: QueueCapacity) -> (TokenSender, TokenStream) {
    match queue {
        QueueCapacity::Bounded(capacity) => {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            (TokenSender::Bounded(tx), ReceiverStream::new(rx).boxed())
        }
        QueueCapacity::Unbounded => {
            let (tx, rx) = mpsc::unbounded_channel();
            (TokenSender::Unbounded(tx), UnboundedReceiverStream::new(rx).boxed())
        }
    }
}

struct Pump {
    transport: Arc<dyn HttpTransport>,
    metrics: Arc<dyn MetricsSink>,
    provider: String,
    tx: TokenSender,
}

impl Pump {
    async fn run(self, prompt: StreamPrompt, context: StreamContext, cancel: CancellationToken) {
        let started = Instant::now();
        let trace_id = context.trace_id.as_str();
        let request_id = context.request_id.as_str();
        info!(trace_id, request_id, stage = "prepare", "Stream request start");

        let mut budget = IoBudget::new(context.policy.timeout);
        let result = self.exchange(&prompt, &context, &cancel, &mut budget).await;

        let error_class = result.as_ref().err().map(error_class_name);
        match &result {
            Ok(()) => info!(trace_id, request_id, "Stream request completed"),
            Err(StreamError::Canceled) => info!(trace_id, request_id, "Stream request canceled"),
            Err(err) if err.class() == Some(StreamErrorClass::NetworkTimeout) => {
                warn!(trace_id, request_id, "Stream request timeout")
            }
            Err(err) => error!(
                trace_id,
                request_id,
                error_class = error_class.unwrap_or("none"),
                error = %err,
                "Stream request failed"
            ),
        }

        let latency = started.elapsed();
        let status = if result.is_ok() {
            RequestStatus::Success
        } else {
            RequestStatus::Failure
        };
        self.metrics.record_latency(&self.provider, latency);
        self.metrics.record_request(&self.provider, status, error_class);
        info!(
            trace_id,
            request_id,
            status = %status,
            error_class = error_class.unwrap_or("none"),
            latency_ms = latency.as_millis() as u64,
            "Stream request summary"
        );

        if let Err(err) = result {
            // A receiver that already left does not need the error.
            let _ = self.tx.send(Err(err)).await;
        }
    }

    async fn exchange(
        &self,
        prompt: &StreamPrompt,
        context: &StreamContext,
        cancel: &CancellationToken,
        budget: &mut IoBudget,
    ) -> Result<(), StreamError> {
        let payload = serde_json::to_vec(prompt).map_err(|e| StreamError::Provider {
            class: StreamErrorClass::HttpError,
            message: "Request send failed".into(),
            status_code: None,
            details: Some(e.to_string()),
        })?;
        self.metrics
            .record_bytes_sent(&self.provider, payload.len() as u64);

        let mut request = HttpRequest::post(&context.endpoint, payload)
            .header("Content-Type", "application/json")
            .bearer(context.api_key.as_deref());
        for (name, value) in &context.headers {
            request = request.header(name, value);
        }

        let response = budget
            .spend(self.transport.send_streaming(request, cancel))
            .await?
            .map_err(stream_error_from_transport)?;

        if !response.is_success() {
            let status = response.status;
            let details = budget
                .spend(read_truncated(response.body, MAX_ERROR_DETAILS))
                .await?;
            error!(
                trace_id = %context.trace_id,
                request_id = %context.request_id,
                status,
                "Provider failure"
            );
            return Err(StreamError::Provider {
                class: StreamErrorClass::HttpError,
                message: "Provider returned non-success status".into(),
                status_code: Some(status),
                details: Some(details),
            });
        }

        info!(
            trace_id = %context.trace_id,
            request_id = %context.request_id,
            stage = "streaming",
            "Stream request streaming"
        );

        let mut body = response.body;
        let mut buffer: Vec<u8> = Vec::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StreamError::Canceled),
                next = budget.spend(body.next()) => next?,
            };
            match next {
                Some(Ok(bytes)) => {
                    buffer.extend_from_slice(&bytes);
                    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = buffer.drain(..=pos).collect();
                        self.forward_line(&line, context, cancel).await?;
                    }
                }
                Some(Err(err)) => return Err(stream_error_from_transport(err)),
                None => break,
            }
        }

        if !buffer.is_empty() {
            self.forward_line(&buffer, context, cancel).await?;
        }
        Ok(())
    }

    async fn forward_line(
        &self,
        raw: &[u8],
        context: &StreamContext,
        cancel: &CancellationToken,
    ) -> Result<(), StreamError> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Ok(());
        }
        self.metrics
            .record_bytes_received(&self.provider, line.len() as u64);

        let payload: Option<TokenPayload> = serde_json::from_str(line).map_err(|e| {
            error!(
                trace_id = %context.trace_id,
                request_id = %context.request_id,
                error = %e,
                "Decode failure"
            );
            StreamError::Provider {
                class: StreamErrorClass::DecodeError,
                message: "Unable to decode provider token".into(),
                status_code: None,
                details: Some(e.to_string()),
            }
        })?;
        let Some(payload) = payload else {
            return Ok(());
        };

        let token = StreamedToken {
            content: payload.content.unwrap_or_default(),
            is_final: payload.is_final,
            received_at: Utc::now(),
        };
        self.tx.deliver(token, cancel).await
    }
}

fn error_class_name(err: &StreamError) -> &'static str {
    match err {
        StreamError::Provider { class, .. } => class.as_str(),
        StreamError::Canceled => "Canceled",
    }
}

fn stream_error_from_transport(err: TransportError) -> StreamError {
    match err {
        TransportError::Canceled => StreamError::Canceled,
        TransportError::Timeout(details) => StreamError::Provider {
            class: StreamErrorClass::NetworkTimeout,
            message: "Provider call timed out".into(),
            status_code: None,
            details: Some(details),
        },
        TransportError::Network(details) => StreamError::Provider {
            class: StreamErrorClass::HttpError,
            message: "Request send failed".into(),
            status_code: None,
            details: Some(details),
        },
    }
}

async fn read_truncated(
    mut body: BoxStream<'static, Result<Vec<u8>, TransportError>>,
    limit: usize,
) -> String {
    let mut bytes = Vec::new();
    // Four bytes per char is enough to fill `limit` chars.
    while bytes.len() < limit * 4 {
        match body.next().await {
            Some(Ok(chunk)) => bytes.extend_from_slice(&chunk),
            _ => break,
        }
    }
    String::from_utf8_lossy(&bytes).chars().take(limit).collect()
}
