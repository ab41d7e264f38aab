//! Core building blocks for span-emitting transport decorators.
//!
//! The wrapper crates (`tracewrap-http`, `tracewrap-redis`,
//! `tracewrap-elastic`) all instrument the same way: start a span, tag it
//! with request metadata, run the wrapped call, tag the outcome, and finish
//! the span on every exit path. This crate holds the shared pieces:
//!
//! * [`CallTracer`] — an explicitly injected tracer + propagation format,
//!   so instrumented code carries no hidden global state.
//! * [`ActiveSpan`] — a guard that finishes its span exactly once, whether
//!   the call returns, errors, or unwinds.
//! * [`HeaderInjector`] / [`HeaderExtractor`] — carriers for propagating a
//!   span context through `http::HeaderMap`.
//! * [`operation_name`] — low-cardinality operation naming for HTTP paths.
//! * [`capture_body`] — the size-bounded request body capture policy.
//! * [`HttpClient`] — the round-trip contract the HTTP-shaped wrappers
//!   decorate, with a feature-gated [`reqwest`] implementation.
//!
//! This crate is a pure consumer of the [`opentelemetry`] trace API; it
//! implements no tracing backend of its own.

mod call;
mod capture;
mod client;
mod error;
mod operation;
mod propagation;

pub use call::{ActiveSpan, CallTracer};
pub use capture::{capture_body, MAX_CONTENT_LENGTH};
pub use client::HttpClient;
pub use error::{HttpError, InjectError, RequestError};
pub use operation::operation_name;
pub use propagation::{HeaderExtractor, HeaderInjector};

#[doc(no_inline)]
pub use bytes::Bytes;
#[doc(no_inline)]
pub use http::{Request, Response};
