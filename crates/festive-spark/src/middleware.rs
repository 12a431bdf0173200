// middleware.rs -- Interceptors around the single backend call (Layer 3).
//
// Requests pass through middleware in registration order; responses come back
// in reverse order.

use festive_spark_types::{BackendRequest, BackendResponse, BoxFuture, Error};

/// Handle to the rest of the chain: the next middleware, or the backend.
pub struct Next<'a> {
    pub(crate) run_fn:
        Box<dyn FnOnce(BackendRequest) -> BoxFuture<'a, Result<BackendResponse, Error>> + Send + 'a>,
}

impl<'a> Next<'a> {
    pub fn run(self, request: BackendRequest) -> BoxFuture<'a, Result<BackendResponse, Error>> {
        (self.run_fn)(request)
    }
}

/// Cross-cutting behaviour around the backend call.
///
/// Implementations call `next.run(request)` to continue; returning without
/// calling it short-circuits the backend.
pub trait Middleware: Send + Sync {
    fn process<'a>(
        &'a self,
        request: BackendRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<BackendResponse, Error>> {
        next.run(request)
    }
}

/// Logs one line per backend request and one per response at `info` level.
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn process<'a>(
        &'a self,
        request: BackendRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<BackendResponse, Error>> {
        Box::pin(async move {
            let request_id = request.request_id.clone();
            tracing::info!(
                request_id = %request_id,
                prompt_chars = request.prompt.chars().count(),
                output_fields = request.output_spec.len(),
                "Backend request"
            );

            let start = std::time::Instant::now();
            let result = next.run(request).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            match &result {
                Ok(response) => tracing::info!(
                    request_id = %request_id,
                    backend = %response.backend,
                    model = %response.model,
                    finish_reason = %response.finish_reason.reason,
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    duration_ms,
                    "Backend response"
                ),
                Err(err) => tracing::warn!(
                    request_id = %request_id,
                    error = %err,
                    duration_ms,
                    "Backend call failed"
                ),
            }
            result
        })
    }
}

/// Run `request` through `middleware[index..]` and then `last`.
pub(crate) fn run_chain<'a, F>(
    middleware: &'a [std::sync::Arc<dyn Middleware>],
    request: BackendRequest,
    last: F,
) -> BoxFuture<'a, Result<BackendResponse, Error>>
where
    F: FnOnce(BackendRequest) -> BoxFuture<'a, Result<BackendResponse, Error>> + Send + 'a,
{
    match middleware.split_first() {
        None => last(request),
        Some((first, rest)) => {
            let next = Next {
                run_fn: Box::new(move |req| run_chain(rest, req, last)),
            };
            first.process(request, next)
        }
    }
}
