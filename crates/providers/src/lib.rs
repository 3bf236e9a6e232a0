//! Text generation providers for Talewright.
//!
//! Every service here talks to the network through
//! [`talewright_core::HttpTransport`]; [`ReqwestTransport`] is the production
//! implementation. The router builds services from configuration.

pub mod huggingface;
pub mod openai_compat;
pub mod router;
pub mod streaming;
pub mod transport;

pub use huggingface::HuggingFaceTextService;
pub use openai_compat::OpenAiCompatService;
pub use router::{ProviderRouter, build_from_config};
pub use streaming::{
    QueueCapacity, StreamContext, StreamPrompt, StreamedToken, StreamingPolicy, TokenStream,
    TokenStreamService,
};
pub use transport::ReqwestTransport;

use talewright_core::{ProviderError, TransportError};

/// Map a transport failure onto the provider error space.
pub(crate) fn provider_error_from_transport(err: TransportError) -> ProviderError {
    match err {
        TransportError::Canceled => ProviderError::Canceled,
        TransportError::Timeout(message) => ProviderError::Timeout(message),
        TransportError::Network(message) => ProviderError::Network(message),
    }
}

/// Shared status handling for buffered provider calls.
pub(crate) fn check_status(
    provider: &str,
    response: &talewright_core::HttpResponse,
) -> Result<(), ProviderError> {
    match response.status {
        429 => Err(ProviderError::RateLimited {
            retry_after_secs: 5,
        }),
        401 | 403 => Err(ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        )),
        status if !response.is_success() => {
            let body = response.text();
            tracing::warn!(provider, status, body = %body, "Provider returned error");
            Err(ProviderError::ApiError {
                status_code: status,
                message: body,
            })
        }
        _ => Ok(()),
    }
}
