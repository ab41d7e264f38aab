//! Span-emitting decorators for HTTP clients and handlers.
//!
//! [`TracedClient`] wraps an outbound round trip: each request gets a client
//! span named after its method and first path segment, the span context is
//! injected into the request headers, and the response status (or transport
//! error) is tagged before the span finishes.
//!
//! [`TracedHandler`] wraps an inbound handler: the upstream span context is
//! extracted from the request headers when present, the handler runs inside
//! the span's context so nested outbound calls chain as children, and the
//! response metadata is tagged afterwards.
//!
//! Both wrappers finish their span on every exit path, including panics in
//! the wrapped handler.

mod client;
mod server;

pub use client::TracedClient;
pub use server::{HttpHandler, TracedHandler};
