//! Head-first streaming sink over a transport.

use std::fmt::Display;

use futures::{Sink, SinkExt};
use resident_core::{Headers, StatusCode, StreamFrame};

use crate::error::StreamError;

/// State of the streaming sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkState {
    /// Nothing sent yet.
    Initial,
    /// Head sent, data may follow.
    HeadSent,
    /// End frame sent.
    Completed,
}

/// Transport sink that enforces head, then data, then end.
///
/// Generic over any `Sink<StreamFrame>`, so a transport can hand in a channel
/// sender, a connection writer or a plain `Vec` in tests.
pub struct StreamingSink<S, E>
where
    S: Sink<StreamFrame, Error = E> + Unpin,
    E: Display,
{
    inner: S,
    state: SinkState,
    chunks_sent: usize,
    bytes_sent: usize,
}

impl<S, E> StreamingSink<S, E>
where
    S: Sink<StreamFrame, Error = E> + Unpin,
    E: Display,
{
    /// Wrap a transport sink.
    pub fn new(sink: S) -> Self {
        Self {
            inner: sink,
            state: SinkState::Initial,
            chunks_sent: 0,
            bytes_sent: 0,
        }
    }

    /// Send status and headers. Must come first and only once.
    pub async fn send_head(&mut self, status: StatusCode, headers: Headers) -> Result<(), StreamError> {
        match self.state {
            SinkState::Initial => {}
            SinkState::HeadSent => return Err(StreamError::HeadAlreadySent),
            SinkState::Completed => return Err(StreamError::Completed),
        }

        self.inner
            .send(StreamFrame::Head { status, headers })
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))?;
        self.state = SinkState::HeadSent;

        Ok(())
    }

    /// Send one body chunk. The head must have been sent.
    pub async fn send_chunk(&mut self, chunk: Vec<u8>) -> Result<(), StreamError> {
        match self.state {
            SinkState::Initial => return Err(StreamError::HeadNotSent),
            SinkState::Completed => return Err(StreamError::Completed),
            SinkState::HeadSent => {}
        }

        let len = chunk.len();
        self.inner
            .send(StreamFrame::Data(chunk))
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))?;
        self.chunks_sent += 1;
        self.bytes_sent += len;

        Ok(())
    }

    /// Send the end frame.
    pub async fn complete(&mut self) -> Result<(), StreamError> {
        match self.state {
            SinkState::Initial => return Err(StreamError::HeadNotSent),
            SinkState::Completed => return Err(StreamError::Completed),
            SinkState::HeadSent => {}
        }

        self.inner
            .send(StreamFrame::End)
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))?;
        self.state = SinkState::Completed;

        Ok(())
    }

    /// Whether the head went out.
    pub fn head_sent(&self) -> bool {
        self.state != SinkState::Initial
    }

    /// Whether the end frame went out.
    pub fn is_complete(&self) -> bool {
        self.state == SinkState::Completed
    }

    /// Data frames sent.
    pub fn chunks_sent(&self) -> usize {
        self.chunks_sent
    }

    /// Body bytes sent.
    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }

    /// Consume the sink and return the transport.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_frames_in_order() {
        let mut frames: Vec<StreamFrame> = Vec::new();
        let mut sink = StreamingSink::new(&mut frames);
        sink.send_head(StatusCode::OK, Headers::new()).await.unwrap();
        sink.send_chunk(b"ab".to_vec()).await.unwrap();
        sink.send_chunk(b"cde".to_vec()).await.unwrap();
        sink.complete().await.unwrap();
        assert_eq!(sink.chunks_sent(), 2);
        assert_eq!(sink.bytes_sent(), 5);
        assert!(sink.is_complete());
        drop(sink);

        assert_eq!(frames.len(), 4);
        assert!(matches!(frames[0], StreamFrame::Head { status, .. } if status == StatusCode::OK));
        assert_eq!(frames[1], StreamFrame::Data(b"ab".to_vec()));
        assert_eq!(frames[3], StreamFrame::End);
    }

    #[tokio::test]
    async fn test_data_before_head_rejected() {
        let mut frames: Vec<StreamFrame> = Vec::new();
        let mut sink = StreamingSink::new(&mut frames);
        assert_eq!(sink.send_chunk(b"x".to_vec()).await, Err(StreamError::HeadNotSent));
        assert_eq!(sink.complete().await, Err(StreamError::HeadNotSent));
        assert!(!sink.head_sent());
    }

    #[tokio::test]
    async fn test_nothing_after_end() {
        let mut frames: Vec<StreamFrame> = Vec::new();
        let mut sink = StreamingSink::new(&mut frames);
        sink.send_head(StatusCode::OK, Headers::new()).await.unwrap();
        assert_eq!(
            sink.send_head(StatusCode::OK, Headers::new()).await,
            Err(StreamError::HeadAlreadySent)
        );
        sink.complete().await.unwrap();
        assert_eq!(sink.send_chunk(b"late".to_vec()).await, Err(StreamError::Completed));
    }

    #[tokio::test]
    async fn test_closed_transport() {
        let (tx, rx) = mpsc::unbounded::<StreamFrame>();
        drop(rx);
        let mut sink = StreamingSink::new(tx);
        let err = sink.send_head(StatusCode::OK, Headers::new()).await.unwrap_err();
        assert!(matches!(err, StreamError::Transport(_)));
    }

    #[tokio::test]
    async fn test_channel_transport() {
        let (tx, rx) = mpsc::unbounded::<StreamFrame>();
        let mut sink = StreamingSink::new(tx);
        sink.send_head(StatusCode::CREATED, Headers::new()).await.unwrap();
        sink.send_chunk(b"x".to_vec()).await.unwrap();
        sink.complete().await.unwrap();
        drop(sink);

        let frames: Vec<StreamFrame> = rx.collect().await;
        assert_eq!(frames.len(), 3);
    }
}
