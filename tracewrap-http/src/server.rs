use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use opentelemetry::trace::{SpanKind, Tracer};
use opentelemetry::{Context, KeyValue};
use opentelemetry_semantic_conventions::attribute::{
    HTTP_REQUEST_METHOD, HTTP_RESPONSE_BODY_SIZE, NETWORK_PEER_ADDRESS, URL_PATH,
};
use tracewrap::{operation_name, CallTracer};

/// The request handler contract wrapped by [`TracedHandler`].
///
/// The handler receives the execution context carrying the server span, so
/// outbound calls it makes can chain as children of the inbound request.
#[async_trait]
pub trait HttpHandler: Send + Sync {
    async fn serve(&self, cx: &Context, request: Request<Bytes>) -> Response<Bytes>;
}

/// An inbound request handler bracketed by a server span.
///
/// An upstream span context is extracted from the request headers when one
/// is present; absent or malformed headers degrade to a root span and never
/// fail the request. After the handler returns, the method, path, peer host,
/// status code, and response size are tagged; 5xx statuses mark the span as
/// failed. The span finishes even when the wrapped handler panics.
pub struct TracedHandler<H, T> {
    inner: H,
    tracer: CallTracer<T>,
}

impl<H, T> TracedHandler<H, T>
where
    H: HttpHandler,
    T: Tracer,
    T::Span: Send + Sync + 'static,
{
    pub fn new(inner: H, tracer: CallTracer<T>) -> Self {
        TracedHandler { inner, tracer }
    }

    pub async fn call(&self, request: Request<Bytes>) -> Response<Bytes> {
        let parent = self.tracer.extract(request.headers());
        let name = operation_name(request.method().as_str(), request.uri().path());
        #[cfg(feature = "internal-logs")]
        tracing::debug!(
            target: "tracewrap",
            operation = %name,
            correlated = parent.is_some(),
            "handling traced request"
        );

        let span = self.tracer.start(
            name,
            SpanKind::Server,
            parent.as_ref(),
            vec![
                KeyValue::new(HTTP_REQUEST_METHOD, request.method().to_string()),
                KeyValue::new(URL_PATH, request.uri().path().to_owned()),
            ],
        );
        if let Some(peer) = peer_host(&request) {
            span.set_attribute(KeyValue::new(NETWORK_PEER_ADDRESS, peer));
        }

        let response = self.inner.serve(span.context(), request).await;

        span.record_status(response.status().as_u16());
        span.set_attribute(KeyValue::new(
            HTTP_RESPONSE_BODY_SIZE,
            response.body().len() as i64,
        ));
        response
    }
}

fn peer_host(request: &Request<Bytes>) -> Option<String> {
    if let Some(host) = request.uri().host() {
        return Some(host.to_owned());
    }
    request
        .headers()
        .get(http::header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TracedClient;
    use futures_util::FutureExt;
    use opentelemetry::trace::{SpanId, Status, TracerProvider as _};
    use opentelemetry::Value;
    use opentelemetry_sdk::propagation::TraceContextPropagator;
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracer, SdkTracerProvider, SpanData};
    use std::panic::AssertUnwindSafe;
    use tracewrap::{HttpClient, HttpError};

    const TRACEPARENT: &str = "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01";

    struct StaticHandler {
        status: u16,
        body: &'static str,
    }

    #[async_trait]
    impl HttpHandler for StaticHandler {
        async fn serve(&self, _cx: &Context, _request: Request<Bytes>) -> Response<Bytes> {
            Response::builder()
                .status(self.status)
                .body(Bytes::from_static(self.body.as_bytes()))
                .unwrap()
        }
    }

    struct PanickingHandler;

    #[async_trait]
    impl HttpHandler for PanickingHandler {
        async fn serve(&self, _cx: &Context, _request: Request<Bytes>) -> Response<Bytes> {
            panic!("handler blew up");
        }
    }

    fn test_tracer() -> (CallTracer<SdkTracer>, InMemorySpanExporter) {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let tracer = CallTracer::new(provider.tracer("test"), TraceContextPropagator::new());
        (tracer, exporter)
    }

    fn find_attr(span: &SpanData, key: &str) -> Option<Value> {
        span.attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| kv.value.clone())
    }

    fn inbound(uri: &str, traceparent: Option<&str>) -> Request<Bytes> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(value) = traceparent {
            builder = builder.header("traceparent", value);
        }
        builder.body(Bytes::new()).unwrap()
    }

    #[tokio::test]
    async fn correlates_with_upstream_context() {
        let (tracer, exporter) = test_tracer();
        let handler = TracedHandler::new(StaticHandler { status: 200, body: "ok" }, tracer);

        let response = handler
            .call(inbound("http://svc/users/42", Some(TRACEPARENT)))
            .await;
        assert_eq!(response.status(), 200);

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "GET /users");
        assert_eq!(spans[0].span_kind, SpanKind::Server);
        assert_eq!(
            spans[0].span_context.trace_id().to_string(),
            "0af7651916cd43dd8448eb211c80319c"
        );
        assert_eq!(
            spans[0].parent_span_id,
            SpanId::from_hex("b7ad6b7169203331").unwrap()
        );
    }

    #[tokio::test]
    async fn malformed_context_degrades_to_root_span() {
        let (tracer, exporter) = test_tracer();
        let handler = TracedHandler::new(StaticHandler { status: 200, body: "ok" }, tracer);

        let response = handler
            .call(inbound("http://svc/users/42", Some("garbage")))
            .await;
        assert_eq!(response.status(), 200, "request handling proceeds normally");

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].parent_span_id, SpanId::INVALID);
    }

    #[tokio::test]
    async fn absent_context_starts_root_span() {
        let (tracer, exporter) = test_tracer();
        let handler = TracedHandler::new(StaticHandler { status: 200, body: "ok" }, tracer);

        handler.call(inbound("http://svc/users/42", None)).await;

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans[0].parent_span_id, SpanId::INVALID);
    }

    #[tokio::test]
    async fn response_metadata_is_tagged() {
        let (tracer, exporter) = test_tracer();
        let handler = TracedHandler::new(StaticHandler { status: 200, body: "hello" }, tracer);

        handler.call(inbound("http://svc/users/42", None)).await;

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(
            find_attr(&spans[0], "http.request.method"),
            Some(Value::String("GET".into()))
        );
        assert_eq!(
            find_attr(&spans[0], "url.path"),
            Some(Value::String("/users/42".into()))
        );
        assert_eq!(
            find_attr(&spans[0], "network.peer.address"),
            Some(Value::String("svc".into()))
        );
        assert_eq!(
            find_attr(&spans[0], "http.response.status_code"),
            Some(Value::I64(200))
        );
        assert_eq!(
            find_attr(&spans[0], "http.response.body.size"),
            Some(Value::I64(5))
        );
    }

    #[tokio::test]
    async fn server_error_status_marks_span_failed() {
        let (tracer, exporter) = test_tracer();
        let handler = TracedHandler::new(StaticHandler { status: 500, body: "boom" }, tracer);

        handler.call(inbound("http://svc/users/42", None)).await;

        let spans = exporter.get_finished_spans().unwrap();
        assert!(matches!(spans[0].status, Status::Error { .. }));
    }

    #[tokio::test]
    async fn panicking_handler_still_finishes_span() {
        let (tracer, exporter) = test_tracer();
        let handler = TracedHandler::new(PanickingHandler, tracer);

        let result = AssertUnwindSafe(handler.call(inbound("http://svc/users/42", None)))
            .catch_unwind()
            .await;
        assert!(result.is_err());

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1, "span finished despite the panic");
    }

    #[derive(Debug, Clone)]
    struct NoopClient;

    #[async_trait]
    impl HttpClient for NoopClient {
        async fn send_bytes(&self, _request: Request<Bytes>) -> Result<Response<Bytes>, HttpError> {
            Ok(Response::builder()
                .status(200)
                .body(Bytes::from_static(b"ok"))
                .unwrap())
        }
    }

    struct ProxyHandler {
        client: TracedClient<NoopClient, SdkTracer>,
    }

    #[async_trait]
    impl HttpHandler for ProxyHandler {
        async fn serve(&self, cx: &Context, _request: Request<Bytes>) -> Response<Bytes> {
            self.client
                .send_with_parent(
                    Request::builder()
                        .method("GET")
                        .uri("http://backend/items")
                        .body(Bytes::new())
                        .unwrap(),
                    Some(cx),
                )
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn nested_outbound_call_chains_as_child() {
        let (tracer, exporter) = test_tracer();
        let handler = TracedHandler::new(
            ProxyHandler {
                client: TracedClient::new(NoopClient, tracer.clone()),
            },
            tracer,
        );

        handler
            .call(inbound("http://svc/users/42", Some(TRACEPARENT)))
            .await;

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 2);
        let server = spans.iter().find(|s| s.span_kind == SpanKind::Server).unwrap();
        let client = spans.iter().find(|s| s.span_kind == SpanKind::Client).unwrap();
        assert_eq!(client.parent_span_id, server.span_context.span_id());
        assert_eq!(client.span_context.trace_id(), server.span_context.trace_id());
    }
}
