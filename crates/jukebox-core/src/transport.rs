//! Transport abstraction for message creation
//!
//! The streaming consumer never talks to `reqwest` directly. It asks a
//! [`MessageTransport`] to send the request and then pulls chunks from the
//! returned [`ChunkSource`] until it reports end of stream.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AttachedFile;

/// Body of `POST /conversations/{id}/messages`
#[derive(Debug, Clone, Serialize)]
pub struct NewMessage {
    pub message: String,
    pub files: Vec<AttachedFile>,
}

/// A readable response body
#[async_trait]
pub trait ChunkSource: Send {
    /// Next chunk of bytes, `Ok(None)` once the body is exhausted
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, ApiError>;
}

/// Sends a new message and hands back the streamed reply
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Fails with [`ApiError::Rejected`] on a non-2xx status, before any body
    /// is read.
    async fn post_message(
        &self,
        conversation_id: &str,
        request: &NewMessage,
    ) -> Result<Box<dyn ChunkSource>, ApiError>;
}

/// [`ChunkSource`] over any byte stream, e.g. `reqwest::Response::bytes_stream`
pub struct ByteStreamSource {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
}

impl ByteStreamSource {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }
}

#[async_trait]
impl ChunkSource for ByteStreamSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, ApiError> {
        match self.inner.next().await {
            Some(Ok(bytes)) => Ok(Some(bytes)),
            Some(Err(e)) => Err(ApiError::from(e)),
            None => Ok(None),
        }
    }
}
