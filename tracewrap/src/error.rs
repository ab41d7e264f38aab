use thiserror::Error;

/// Errors produced when sending HTTP requests through a wrapped client.
pub type HttpError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The propagation format produced a carrier field the header map cannot
/// encode.
///
/// Outbound wrappers treat this as fatal: the request is aborted before the
/// underlying call so the callee never sees a request it cannot correlate.
#[derive(Debug, Error)]
#[error("cannot encode span context into carrier field `{field}`")]
pub struct InjectError {
    /// Name of the carrier field that could not be written.
    pub field: String,
}

/// Error returned by the HTTP-shaped wrappers.
#[derive(Debug, Error)]
pub enum RequestError {
    /// Span context injection failed; the underlying call was not performed.
    #[error(transparent)]
    Inject(#[from] InjectError),
    /// The wrapped transport failed. Passed through verbatim after the span
    /// was tagged.
    #[error("{0}")]
    Transport(HttpError),
}
