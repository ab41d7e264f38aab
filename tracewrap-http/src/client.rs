use bytes::Bytes;
use http::{Request, Response};
use opentelemetry::trace::{SpanKind, Tracer};
use opentelemetry::{Context, KeyValue};
use opentelemetry_semantic_conventions::attribute::{HTTP_REQUEST_METHOD, URL_FULL};
use tracewrap::{capture_body, operation_name, CallTracer, HttpClient, RequestError};

/// Captured textual request body. Not part of the registry; body capture is
/// a debugging aid carried over from the pre-OpenTelemetry convention.
const HTTP_REQUEST_BODY: &str = "http.request.body.content";

/// An outbound HTTP transport that brackets every round trip with a client
/// span.
///
/// The span is named after the request method and first path segment, tagged
/// with the method, full URL, and (when small and textual) the request body,
/// and its context is injected into the outgoing headers so the callee can
/// correlate. The response status code is tagged on completion; transport
/// errors and 5xx statuses mark the span as failed. The span finishes on
/// every path.
#[derive(Debug)]
pub struct TracedClient<C, T> {
    inner: C,
    tracer: CallTracer<T>,
}

impl<C, T> TracedClient<C, T>
where
    C: HttpClient,
    T: Tracer,
    T::Span: Send + Sync + 'static,
{
    pub fn new(inner: C, tracer: CallTracer<T>) -> Self {
        TracedClient { inner, tracer }
    }

    /// Send a request as a new trace root.
    pub async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, RequestError> {
        self.send_with_parent(request, None).await
    }

    /// Send a request as a child of the caller's trace context.
    ///
    /// Injection failure aborts the call: the error is surfaced without
    /// performing the underlying request. All other errors pass through
    /// untouched after the span is tagged.
    pub async fn send_with_parent(
        &self,
        mut request: Request<Bytes>,
        parent: Option<&Context>,
    ) -> Result<Response<Bytes>, RequestError> {
        let name = operation_name(request.method().as_str(), request.uri().path());
        #[cfg(feature = "internal-logs")]
        tracing::debug!(target: "tracewrap", operation = %name, "sending traced request");

        let mut attributes = vec![
            KeyValue::new(HTTP_REQUEST_METHOD, request.method().to_string()),
            KeyValue::new(URL_FULL, request.uri().to_string()),
        ];
        if let Some(body) = capture_body(request.body()) {
            attributes.push(KeyValue::new(HTTP_REQUEST_BODY, body.to_owned()));
        }

        let span = self.tracer.start(name, SpanKind::Client, parent, attributes);

        if let Err(err) = self.tracer.inject(span.context(), request.headers_mut()) {
            span.record_error(&err.to_string());
            return Err(err.into());
        }

        match self.inner.send_bytes(request).await {
            Ok(response) => {
                span.record_status(response.status().as_u16());
                Ok(response)
            }
            Err(err) => {
                span.record_error(&err.to_string());
                Err(RequestError::Transport(err))
            }
        }
    }
}
