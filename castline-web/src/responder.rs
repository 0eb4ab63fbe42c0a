//! Builds streaming responses for registered files.
//!
//! Bodies are read from the resolver on demand in fixed-size chunks, so memory
//! use per request stays at one chunk no matter how large the file is.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::Response;
use bytes::Bytes;
use castline_core::config::StreamingConfig;
use castline_core::{FileLocator, LocatorError, LocatorResolver};
use futures::Stream;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::ReaderStream;

use crate::range::{ByteRange, parse_range_header};

/// Errors raised before response headers are sent.
#[derive(Debug, Error)]
pub enum ResponderError {
    #[error("{0}")]
    Locator(#[from] LocatorError),

    #[error("failed to build response: {0}")]
    Response(#[from] axum::http::Error),
}

/// Serves file content as full, partial or unknown-length responses.
pub struct ContentResponder {
    resolver: Arc<dyn LocatorResolver>,
    config: StreamingConfig,
}

impl ContentResponder {
    /// Creates a responder reading through `resolver`.
    pub fn new(resolver: Arc<dyn LocatorResolver>, config: StreamingConfig) -> Self {
        Self { resolver, config }
    }

    /// Answers a request for `locator`.
    ///
    /// A `Range` header is honoured only when the size is known; ranges that
    /// cannot be satisfied fall back to the full content. With `head_only`
    /// the headers are computed as for GET but the file is never opened.
    ///
    /// # Errors
    ///
    /// - `ResponderError::Locator` - The file could not be inspected or opened,
    ///   or ended before the range start
    /// - `ResponderError::Response` - The content type is not a valid header value
    pub async fn respond(
        &self,
        locator: &FileLocator,
        is_artwork: bool,
        range_header: Option<&str>,
        head_only: bool,
    ) -> Result<Response, ResponderError> {
        let size = self
            .resolver
            .content_length(locator)
            .await?
            .filter(|size| *size > 0);
        let mime = self.content_type(locator, is_artwork);

        let Some(total) = size else {
            return self.respond_unknown_length(locator, mime, head_only).await;
        };

        if let Some(value) = range_header {
            match parse_range_header(value, total) {
                Ok(range) => return self.respond_partial(locator, mime, range, head_only).await,
                Err(e) => tracing::debug!("Serving full content of {}: {}", locator, e),
            }
        }

        self.respond_full(locator, mime, total, head_only).await
    }

    fn content_type(&self, locator: &FileLocator, is_artwork: bool) -> String {
        if is_artwork {
            return self.config.artwork_mime.to_string();
        }
        self.resolver
            .mime_type(locator)
            .unwrap_or_else(|| self.config.fallback_audio_mime.to_string())
    }

    async fn respond_partial(
        &self,
        locator: &FileLocator,
        mime: String,
        range: ByteRange,
        head_only: bool,
    ) -> Result<Response, ResponderError> {
        tracing::debug!("Serving {} of {}", range.content_range(), locator);

        let builder = Response::builder()
            .status(StatusCode::PARTIAL_CONTENT)
            .header(header::CONTENT_TYPE, mime)
            .header(header::ACCEPT_RANGES, "bytes")
            .header(header::CONTENT_LENGTH, range.length())
            .header(header::CONTENT_RANGE, range.content_range());

        if head_only {
            return Ok(builder.body(Body::empty())?);
        }

        let stream = self.resolver.open_at(locator, range.start).await?;
        let body = self.streaming_body(stream.take(range.length()), locator);
        Ok(builder.body(body)?)
    }

    async fn respond_full(
        &self,
        locator: &FileLocator,
        mime: String,
        total: u64,
        head_only: bool,
    ) -> Result<Response, ResponderError> {
        tracing::debug!("Serving all {} bytes of {}", total, locator);

        let builder = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, mime)
            .header(header::ACCEPT_RANGES, "bytes")
            .header(header::CONTENT_LENGTH, total);

        if head_only {
            return Ok(builder.body(Body::empty())?);
        }

        let stream = self.resolver.open(locator).await?;
        let body = self.streaming_body(stream.take(total), locator);
        Ok(builder.body(body)?)
    }

    async fn respond_unknown_length(
        &self,
        locator: &FileLocator,
        mime: String,
        head_only: bool,
    ) -> Result<Response, ResponderError> {
        tracing::debug!("Serving {} with unknown length", locator);

        let builder = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, mime);

        if head_only {
            return Ok(builder.body(Body::empty())?);
        }

        // No Content-Length, so hyper frames the body as chunked
        let stream = self.resolver.open(locator).await?;
        Ok(builder.body(self.streaming_body(stream, locator))?)
    }

    fn streaming_body<R>(&self, reader: R, locator: &FileLocator) -> Body
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let chunks = ReaderStream::with_capacity(reader, self.config.chunk_size);
        Body::from_stream(TrackedStream::new(chunks, locator.clone()))
    }
}

/// Body stream that logs how a transfer ended.
///
/// Read errors end the body; hyper then closes the connection. A stream
/// dropped before its end means the client went away or the server stopped.
struct TrackedStream<S> {
    inner: S,
    locator: FileLocator,
    sent: u64,
    finished: bool,
}

impl<S> TrackedStream<S> {
    fn new(inner: S, locator: FileLocator) -> Self {
        Self {
            inner,
            locator,
            sent: 0,
            finished: false,
        }
    }
}

impl<S> Stream for TrackedStream<S>
where
    S: Stream<Item = std::io::Result<Bytes>> + Unpin,
{
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.sent += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                tracing::debug!(
                    "Read failed on {} after {} bytes: {}",
                    this.locator,
                    this.sent,
                    e
                );
                this.finished = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                tracing::debug!("Finished {} after {} bytes", this.locator, this.sent);
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S> Drop for TrackedStream<S> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(
                "Client stopped reading {} after {} bytes",
                self.locator,
                self.sent
            );
        }
    }
}
