// Backend trait -- the contract every generative text backend implements.

use std::future::Future;
use std::pin::Pin;

use crate::error::Error;
use crate::request::BackendRequest;
use crate::response::BackendResponse;

/// A boxed future that is Send.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The contract every backend implements.
///
/// Uses an explicit BoxFuture return type instead of the `async-trait` macro
/// so the trait stays object-safe with visible lifetime bounds.
///
/// Implementations surface every failure (transport, refusal, unreadable
/// body) as `ErrorKind::BackendFailure` with a `BackendCause`.
pub trait Backend: Send + Sync {
    /// Backend name (e.g., "gemini", "openai-compatible").
    fn name(&self) -> &str;

    /// Send one rendered prompt and return the full response.
    fn complete(&self, request: BackendRequest) -> BoxFuture<'_, Result<BackendResponse, Error>>;

    /// Release resources.
    fn close(&self) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async { Ok(()) })
    }
}
