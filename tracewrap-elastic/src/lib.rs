//! Span-emitting decorator for search-engine HTTP transports.
//!
//! [`TracedTransport`] wraps an [`HttpClient`] addressing a search engine.
//! It has the same shape as the plain HTTP client decorator but tags what
//! matters when reading a query trace: the addressed instance, the endpoint
//! path, the query-string parameters, and (when small and textual) the query
//! body. The response status is tagged on completion; transport errors and
//! 5xx statuses mark the span as failed, and the span finishes on every path.

use bytes::Bytes;
use http::{Request, Response};
use opentelemetry::trace::{SpanKind, Tracer};
use opentelemetry::{Context, KeyValue};
use opentelemetry_semantic_conventions::attribute::{
    DB_QUERY_TEXT, DB_SYSTEM_NAME, HTTP_REQUEST_METHOD, SERVER_ADDRESS, URL_PATH, URL_QUERY,
};
use tracewrap::{capture_body, operation_name, CallTracer, HttpClient, RequestError};

/// An HTTP transport to a search engine that brackets every round trip with
/// a client span.
#[derive(Debug)]
pub struct TracedTransport<C, T> {
    inner: C,
    tracer: CallTracer<T>,
}

impl<C, T> TracedTransport<C, T>
where
    C: HttpClient,
    T: Tracer,
    T::Span: Send + Sync + 'static,
{
    pub fn new(inner: C, tracer: CallTracer<T>) -> Self {
        TracedTransport { inner, tracer }
    }

    /// Send a query as a new trace root.
    pub async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, RequestError> {
        self.send_with_parent(request, None).await
    }

    /// Send a query as a child of the caller's trace context.
    ///
    /// Injection failure aborts the call before the engine is contacted.
    /// Transport errors pass through untouched after the span is tagged.
    pub async fn send_with_parent(
        &self,
        mut request: Request<Bytes>,
        parent: Option<&Context>,
    ) -> Result<Response<Bytes>, RequestError> {
        let name = operation_name(request.method().as_str(), request.uri().path());
        #[cfg(feature = "internal-logs")]
        tracing::debug!(target: "tracewrap", operation = %name, "sending traced query");

        let mut attributes = vec![
            KeyValue::new(DB_SYSTEM_NAME, "elasticsearch"),
            KeyValue::new(HTTP_REQUEST_METHOD, request.method().to_string()),
            KeyValue::new(URL_PATH, request.uri().path().to_owned()),
        ];
        if let Some(host) = request.uri().host() {
            attributes.push(KeyValue::new(SERVER_ADDRESS, host.to_owned()));
        }
        if let Some(query) = request.uri().query() {
            attributes.push(KeyValue::new(URL_QUERY, query.to_owned()));
        }
        if let Some(body) = capture_body(request.body()) {
            attributes.push(KeyValue::new(DB_QUERY_TEXT, body.to_owned()));
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
