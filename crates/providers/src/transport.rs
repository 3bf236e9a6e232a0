//! reqwest-backed [`HttpTransport`].

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use talewright_core::{
    CancellationToken, HttpMethod, HttpRequest, HttpResponse, HttpTransport, StreamingResponse,
    TransportError,
};
use tracing::debug;

/// The production transport. Cheap to clone; clones share a connection pool.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// A transport with a 120 second overall request timeout.
    ///
    /// Falls back to reqwest's default client if the builder rejects the
    /// configuration.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    /// No overall timeout. Streaming callers enforce their own deadline.
    pub fn streaming() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build(&self, request: HttpRequest) -> reqwest::RequestBuilder {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }
        builder
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn map_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}

fn collect_headers(headers: &reqwest::header::HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, TransportError> {
        if cancel.is_cancelled() {
            return Err(TransportError::Canceled);
        }
        debug!(url = %request.url, "Sending request");

        let call = async {
            let response = self.build(request).send().await.map_err(map_error)?;
            let status = response.status().as_u16();
            let headers = collect_headers(response.headers());
            let body = response.bytes().await.map_err(map_error)?.to_vec();
            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Canceled),
            result = call => result,
        }
    }

    async fn send_streaming(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<StreamingResponse, TransportError> {
        if cancel.is_cancelled() {
            return Err(TransportError::Canceled);
        }
        debug!(url = %request.url, "Opening streaming request");

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Canceled),
            result = self.build(request).send() => result.map_err(map_error)?,
        };

        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(map_error))
            .boxed();

        Ok(StreamingResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn canceled_before_send() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let transport = ReqwestTransport::new();

        let err = transport
            .send(HttpRequest::get("http://127.0.0.1:9/never"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Canceled));

        let err = transport
            .send_streaming(HttpRequest::get("http://127.0.0.1:9/never"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Canceled));
    }
}
