use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use std::fmt::Debug;

use crate::error::HttpError;

/// A minimal interface for one HTTP round trip.
///
/// The HTTP-shaped wrappers decorate this trait rather than any concrete
/// client, so users bring whichever client (and async runtime) they already
/// use. Responses are returned whole, whatever their status code; mapping
/// error statuses onto span state is the wrapper's job, not the client's.
#[async_trait]
pub trait HttpClient: Debug + Send + Sync {
    /// Send the specified HTTP request with `Bytes` payload.
    ///
    /// Returns the HTTP response including the status code and body, or an
    /// error if the request could not be completed at the transport level.
    async fn send_bytes(&self, request: Request<Bytes>) -> Result<Response<Bytes>, HttpError>;
}

#[cfg(feature = "reqwest")]
mod reqwest {
    use super::{async_trait, Bytes, HttpClient, HttpError, Request, Response};

    #[async_trait]
    impl HttpClient for reqwest::Client {
        async fn send_bytes(&self, request: Request<Bytes>) -> Result<Response<Bytes>, HttpError> {
            #[cfg(feature = "internal-logs")]
            tracing::debug!(target: "tracewrap", "sending request via reqwest client");
            let request = request.try_into()?;
            let mut response = self.execute(request).await?;
            let headers = std::mem::take(response.headers_mut());
            let mut http_response = Response::builder()
                .status(response.status())
                .body(response.bytes().await?)?;
            *http_response.headers_mut() = headers;

            Ok(http_response)
        }
    }
}
