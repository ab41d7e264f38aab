use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use opentelemetry::propagation::TextMapPropagator;
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};
use opentelemetry_semantic_conventions::attribute::HTTP_RESPONSE_STATUS_CODE;

use crate::error::InjectError;
use crate::propagation::{HeaderExtractor, HeaderInjector};

/// An explicitly injected tracer plus the propagation format used to carry
/// span contexts across process boundaries.
///
/// Every wrapper is constructed with a `CallTracer` instead of reaching for
/// process-wide state, which keeps instrumented code testable. The type
/// parameter is the backend tracer; use [`opentelemetry::global::BoxedTracer`]
/// when the tracer comes from the global provider.
///
/// ```no_run
/// use opentelemetry::global;
/// use opentelemetry_sdk::propagation::TraceContextPropagator;
/// use tracewrap::CallTracer;
///
/// let tracer = CallTracer::new(global::tracer("my-lib"), TraceContextPropagator::new());
/// ```
pub struct CallTracer<T> {
    tracer: T,
    propagator: Arc<dyn TextMapPropagator + Send + Sync>,
}

impl<T: Clone> Clone for CallTracer<T> {
    fn clone(&self) -> Self {
        CallTracer {
            tracer: self.tracer.clone(),
            propagator: self.propagator.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for CallTracer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallTracer")
            .field("tracer", &self.tracer)
            .finish()
    }
}

impl<T> CallTracer<T>
where
    T: Tracer,
    T::Span: Send + Sync + 'static,
{
    pub fn new(tracer: T, propagator: impl TextMapPropagator + Send + Sync + 'static) -> Self {
        CallTracer {
            tracer,
            propagator: Arc::new(propagator),
        }
    }

    /// Start a span for one wrapped call.
    ///
    /// With `parent: None` the span is a root: parenting is always explicit,
    /// never taken from the thread-local current context.
    pub fn start(
        &self,
        name: impl Into<Cow<'static, str>>,
        kind: SpanKind,
        parent: Option<&Context>,
        attributes: Vec<KeyValue>,
    ) -> ActiveSpan {
        let parent_cx = match parent {
            Some(cx) => cx.clone(),
            None => Context::new(),
        };
        let builder = self
            .tracer
            .span_builder(name)
            .with_kind(kind)
            .with_attributes(attributes);
        let span = self.tracer.build_with_context(builder, &parent_cx);
        ActiveSpan {
            cx: parent_cx.with_span(span),
            ended: false,
        }
    }

    /// Serialize the span context carried by `cx` into outgoing request
    /// headers.
    ///
    /// Fails when the propagation format produces a field the header map
    /// cannot encode; outbound wrappers abort the call in that case.
    pub fn inject(&self, cx: &Context, headers: &mut http::HeaderMap) -> Result<(), InjectError> {
        let mut injector = HeaderInjector::new(headers);
        self.propagator.inject_context(cx, &mut injector);
        injector.into_result()
    }

    /// Deserialize a span context from incoming request headers.
    ///
    /// Returns `None` when the headers carry no usable context — absent and
    /// malformed headers look the same to the caller, which then starts a
    /// root span. Extraction is never an error.
    pub fn extract(&self, headers: &http::HeaderMap) -> Option<Context> {
        let cx = self.propagator.extract(&HeaderExtractor(headers));
        let valid = cx.span().span_context().is_valid();
        valid.then_some(cx)
    }
}

/// A span for a call in flight.
///
/// The guard finishes the span exactly once: either through [`end`], or on
/// drop when the call returns early or unwinds.
///
/// [`end`]: ActiveSpan::end
#[derive(Debug)]
pub struct ActiveSpan {
    cx: Context,
    ended: bool,
}

impl ActiveSpan {
    /// The execution context carrying this span.
    ///
    /// Hand it to nested outbound calls so they chain as children, and to
    /// [`CallTracer::inject`] for header propagation.
    pub fn context(&self) -> &Context {
        &self.cx
    }

    pub fn set_attribute(&self, attribute: KeyValue) {
        self.cx.span().set_attribute(attribute);
    }

    /// Mark the span as failed.
    pub fn record_error(&self, description: &str) {
        self.cx.span().set_status(Status::error(description.to_string()));
    }

    /// Tag the response status code. Server-side error statuses (5xx) mark
    /// the span as failed even though the call itself returned a response.
    pub fn record_status(&self, status: u16) {
        self.cx
            .span()
            .set_attribute(KeyValue::new(HTTP_RESPONSE_STATUS_CODE, i64::from(status)));
        if (500..=599).contains(&status) {
            self.cx
                .span()
                .set_status(Status::error(format!("server error status {status}")));
        }
    }

    /// Finish the span now. Dropping the guard has the same effect.
    pub fn end(mut self) {
        self.ended = true;
        self.cx.span().end();
    }
}

impl Drop for ActiveSpan {
    fn drop(&mut self) {
        if !self.ended {
            self.cx.span().end();
        }
    }
}
