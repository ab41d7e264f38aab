//! Span-emitting decorator for request/response key-value connections.
//!
//! [`TracedConnection`] wraps a [`CommandExecutor`] so every command is
//! bracketed by a client span tagged with the command name, the rendered
//! statement, and the connection identity. Pipelined use (queue now, receive
//! later) is covered by a single span per flush batch: the first queued
//! command opens the span, later commands append their statements, and the
//! span finishes when the batch is flushed.
//!
//! The wrapper requires `&mut self` throughout, matching the wrapped
//! connection's single-writer assumption; callers sharing a connection must
//! serialize access to it.

use std::fmt;

use opentelemetry::trace::{SpanKind, Tracer};
use opentelemetry::{Context, KeyValue};
use opentelemetry_semantic_conventions::attribute::{
    DB_NAMESPACE, DB_OPERATION_BATCH_SIZE, DB_OPERATION_NAME, DB_QUERY_TEXT, DB_SYSTEM_NAME,
    SERVER_ADDRESS, SERVER_PORT,
};
use thiserror::Error;
use tracewrap::{ActiveSpan, CallTracer};
use url::Url;

/// One argument of a key-value command, rendered into the statement tag.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandArg {
    Str(String),
    Int(i64),
    Bytes(Vec<u8>),
}

impl fmt::Display for CommandArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandArg::Str(value) => f.write_str(value),
            CommandArg::Int(value) => write!(f, "{value}"),
            CommandArg::Bytes(value) => write!(f, "{}", String::from_utf8_lossy(value)),
        }
    }
}

impl From<&str> for CommandArg {
    fn from(value: &str) -> Self {
        CommandArg::Str(value.to_owned())
    }
}

impl From<String> for CommandArg {
    fn from(value: String) -> Self {
        CommandArg::Str(value)
    }
}

impl From<i64> for CommandArg {
    fn from(value: i64) -> Self {
        CommandArg::Int(value)
    }
}

impl From<Vec<u8>> for CommandArg {
    fn from(value: Vec<u8>) -> Self {
        CommandArg::Bytes(value)
    }
}

/// Identity of the wrapped connection, tagged on every span.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub host: String,
    pub port: u16,
    /// Selected database index.
    pub database: i64,
}

impl ConnectionInfo {
    /// Parse host, port, and database index from a `redis://` style URL.
    /// Missing pieces fall back to `localhost`, `6379`, and database `0`.
    pub fn from_url(raw: &str) -> Result<ConnectionInfo, url::ParseError> {
        let url = Url::parse(raw)?;
        let database = url
            .path_segments()
            .and_then(|mut segments| segments.next())
            .and_then(|segment| segment.parse().ok())
            .unwrap_or(0);
        Ok(ConnectionInfo {
            host: url.host_str().unwrap_or("localhost").to_owned(),
            port: url.port().unwrap_or(6379),
            database,
        })
    }

    fn attributes(&self) -> Vec<KeyValue> {
        vec![
            KeyValue::new(DB_SYSTEM_NAME, "redis"),
            KeyValue::new(SERVER_ADDRESS, self.host.clone()),
            KeyValue::new(SERVER_PORT, i64::from(self.port)),
            KeyValue::new(DB_NAMESPACE, self.database.to_string()),
        ]
    }
}

/// The connection contract wrapped by [`TracedConnection`].
///
/// `execute` is the immediate request/response path; `queue`, `flush`, and
/// `receive` are the pipelined path where replies arrive after the batch is
/// flushed.
pub trait CommandExecutor {
    type Reply;
    type Error: std::error::Error + Send + Sync + 'static;

    fn execute(&mut self, command: &str, args: &[CommandArg]) -> Result<Self::Reply, Self::Error>;
    fn queue(&mut self, command: &str, args: &[CommandArg]) -> Result<(), Self::Error>;
    fn flush(&mut self) -> Result<(), Self::Error>;
    fn receive(&mut self) -> Result<Self::Reply, Self::Error>;
}

/// Error returned by the command wrapper.
#[derive(Debug, Error)]
pub enum Error<E>
where
    E: std::error::Error + 'static,
{
    /// The wrapper was invoked without a command; rejected before any span
    /// is created or the connection is touched.
    #[error("called with an empty command name")]
    EmptyCommand,
    /// The wrapped connection failed. Passed through verbatim after the
    /// span was tagged.
    #[error(transparent)]
    Connection(#[from] E),
}

struct PipelineBatch {
    span: ActiveSpan,
    statements: Vec<String>,
}

/// A key-value connection whose commands are bracketed by client spans.
///
/// Not safe for concurrent use by multiple callers on the same instance;
/// the `&mut self` receivers encode that rule.
pub struct TracedConnection<C, T> {
    inner: C,
    tracer: CallTracer<T>,
    info: ConnectionInfo,
    batch: Option<PipelineBatch>,
}

impl<C, T> TracedConnection<C, T>
where
    C: CommandExecutor,
    T: Tracer,
    T::Span: Send + Sync + 'static,
{
    pub fn new(inner: C, tracer: CallTracer<T>, info: ConnectionInfo) -> Self {
        TracedConnection {
            inner,
            tracer,
            info,
            batch: None,
        }
    }

    /// Run one command and wait for its reply, bracketed by a span.
    ///
    /// `parent: None` starts a root span. The reply and any error are
    /// returned unmodified.
    pub fn execute(
        &mut self,
        command: &str,
        args: &[CommandArg],
        parent: Option<&Context>,
    ) -> Result<C::Reply, Error<C::Error>> {
        if command.is_empty() {
            return Err(Error::EmptyCommand);
        }

        let mut attributes = self.info.attributes();
        attributes.push(KeyValue::new(DB_OPERATION_NAME, command.to_owned()));
        attributes.push(KeyValue::new(DB_QUERY_TEXT, render_statement(command, args)));
        let span = self
            .tracer
            .start(format!("redis.{command}"), SpanKind::Client, parent, attributes);

        match self.inner.execute(command, args) {
            Ok(reply) => {
                span.end();
                Ok(reply)
            }
            Err(err) => {
                span.record_error(&err.to_string());
                Err(Error::Connection(err))
            }
        }
    }

    /// Queue a command without waiting for its reply.
    ///
    /// The first queued command on an idle connection opens the batch span
    /// (parented by this call's context); subsequent commands add their
    /// statements to it. Only one batch span is open per connection.
    pub fn queue(
        &mut self,
        command: &str,
        args: &[CommandArg],
        parent: Option<&Context>,
    ) -> Result<(), Error<C::Error>> {
        if command.is_empty() {
            return Err(Error::EmptyCommand);
        }

        if self.batch.is_none() {
            let span = self.tracer.start(
                "redis.pipeline",
                SpanKind::Client,
                parent,
                self.info.attributes(),
            );
            self.batch = Some(PipelineBatch {
                span,
                statements: Vec::new(),
            });
        }

        let statement = render_statement(command, args);
        match self.inner.queue(command, args) {
            Ok(()) => {
                if let Some(batch) = self.batch.as_mut() {
                    batch.statements.push(statement);
                }
                Ok(())
            }
            Err(err) => {
                if let Some(batch) = self.batch.as_ref() {
                    batch.span.record_error(&err.to_string());
                }
                Err(Error::Connection(err))
            }
        }
    }

    /// Flush the queued batch, concluding the batch span.
    ///
    /// The span's statement tag lists every queued command, one per line,
    /// so no command's tags overwrite another's.
    pub fn flush(&mut self) -> Result<(), Error<C::Error>> {
        let result = self.inner.flush();
        if let Some(batch) = self.batch.take() {
            batch
                .span
                .set_attribute(KeyValue::new(DB_QUERY_TEXT, batch.statements.join("\n")));
            batch.span.set_attribute(KeyValue::new(
                DB_OPERATION_BATCH_SIZE,
                batch.statements.len() as i64,
            ));
            if let Err(err) = &result {
                batch.span.record_error(&err.to_string());
            }
            batch.span.end();
        }
        result.map_err(Error::Connection)
    }

    /// Receive one pipelined reply. Forwarded untraced; replies belong to
    /// the batch span concluded at flush time.
    pub fn receive(&mut self) -> Result<C::Reply, Error<C::Error>> {
        self.inner.receive().map_err(Error::Connection)
    }

    pub fn connection_info(&self) -> &ConnectionInfo {
        &self.info
    }
}

fn render_statement(command: &str, args: &[CommandArg]) -> String {
    let mut statement = String::from(command);
    for arg in args {
        statement.push(' ');
        statement.push_str(&arg.to_string());
    }
    statement
}
