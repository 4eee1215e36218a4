//! Native response to transport response.

use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};

use futures::Sink;
use resident_core::{
    header_names, BodyProducer, Headers, NativeBody, NativeResponse, OutgoingBody,
    OutgoingResponse, StatusCode, StreamFrame,
};
use resident_quarantine::Ambient;
use tracing::warn;

use crate::error::{panic_message, RequestError};
use crate::sink::StreamingSink;

/// Converts native responses and delivers streamed bodies.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResponseMapper;

impl ResponseMapper {
    /// Create a response mapper.
    pub fn new() -> Self {
        Self
    }

    /// Map `response`.
    ///
    /// The session is closed first so its data is persisted before anything
    /// reaches the client. Side-channel headers come first in the result,
    /// followed by the response's own headers and then one `Set-Cookie` per
    /// response cookie. The side channel is empty afterwards.
    ///
    /// Streamed bodies are pushed to `sink` as they are produced; buffered
    /// bodies are returned for the transport to write.
    pub async fn map<S, E>(
        &self,
        response: NativeResponse,
        ambient: &mut Ambient,
        sink: &mut StreamingSink<S, E>,
    ) -> OutgoingResponse
    where
        S: Sink<StreamFrame, Error = E> + Unpin,
        E: Display,
    {
        if let Err(e) = ambient.session_mut().close() {
            warn!(error = %e, "failed to persist session");
        }

        let NativeResponse {
            status,
            headers: own,
            cookies,
            body,
        } = response;

        let mut headers = ambient.take_headers();
        headers.extend_from(&own);
        for cookie in &cookies {
            match cookie.to_header_value() {
                Ok(value) => headers.append(header_names::SET_COOKIE, value),
                Err(e) => warn!(error = %e, "dropping response cookie"),
            }
        }

        match body {
            NativeBody::Buffered(bytes) => OutgoingResponse::buffered(status, headers, bytes),
            NativeBody::Streamed(producer) => {
                if let Err(e) = stream(status, headers.clone(), producer, sink).await {
                    warn!(
                        error = %e,
                        chunks = sink.chunks_sent(),
                        "streamed response aborted"
                    );
                }
                OutgoingResponse {
                    status,
                    headers,
                    body: delivered(sink),
                }
            }
        }
    }
}

async fn stream<S, E>(
    status: StatusCode,
    headers: Headers,
    mut producer: BodyProducer,
    sink: &mut StreamingSink<S, E>,
) -> Result<(), RequestError>
where
    S: Sink<StreamFrame, Error = E> + Unpin,
    E: Display,
{
    sink.send_head(status, headers).await?;

    loop {
        let chunk = match catch_unwind(AssertUnwindSafe(|| producer())) {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(payload) => return Err(RequestError::Panicked(panic_message(payload.as_ref()))),
        };
        sink.send_chunk(chunk).await?;
    }

    sink.complete().await?;
    Ok(())
}

fn delivered<S, E>(sink: &StreamingSink<S, E>) -> OutgoingBody
where
    S: Sink<StreamFrame, Error = E> + Unpin,
    E: Display,
{
    OutgoingBody::Streamed {
        chunks: sink.chunks_sent(),
        bytes: sink.bytes_sent(),
        complete: sink.is_complete(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resident_core::ResponseCookie;
    use resident_session::{MemorySessionStore, SessionContext, SessionSettings, SessionStore};
    use std::sync::Arc;

    fn ambient(store: Arc<MemorySessionStore>) -> Ambient {
        Ambient::new(SessionContext::new(SessionSettings::default(), store))
    }

    #[tokio::test]
    async fn test_header_merge_order() {
        let mut ambient = ambient(Arc::new(MemorySessionStore::new()));
        ambient.header("X-Powered-By", "resident");
        ambient.header("Set-Cookie", "legacy=1");

        let response = NativeResponse::new(StatusCode::CREATED, "made")
            .with_header("Content-Type", "text/plain")
            .with_cookie(ResponseCookie::new("theme", "dark"))
            .with_cookie(ResponseCookie::new("lang", "en").with_path("/"));

        let mut frames: Vec<StreamFrame> = Vec::new();
        let mut sink = StreamingSink::new(&mut frames);
        let outgoing = ResponseMapper::new().map(response, &mut ambient, &mut sink).await;

        let headers: Vec<(&str, &str)> = outgoing.headers.iter().collect();
        assert_eq!(
            headers,
            vec![
                ("X-Powered-By", "resident"),
                ("Set-Cookie", "legacy=1"),
                ("Content-Type", "text/plain"),
                ("Set-Cookie", "theme=dark"),
                ("Set-Cookie", "lang=en; Path=/"),
            ]
        );
        assert_eq!(outgoing.status, StatusCode::CREATED);
        assert_eq!(outgoing.body_text(), "made");
        assert!(ambient.headers().is_empty());
        drop(sink);
        assert!(frames.is_empty());
    }

    #[tokio::test]
    async fn test_unserializable_cookie_dropped() {
        let mut ambient = ambient(Arc::new(MemorySessionStore::new()));
        let response = NativeResponse::ok("ok")
            .with_cookie(ResponseCookie::new("bad name", "x"))
            .with_cookie(ResponseCookie::new("note", "a;b\r\nX-Injected: 1"));

        let mut frames: Vec<StreamFrame> = Vec::new();
        let mut sink = StreamingSink::new(&mut frames);
        let outgoing = ResponseMapper::new().map(response, &mut ambient, &mut sink).await;

        let cookies: Vec<&str> = outgoing.headers.get_all("Set-Cookie").collect();
        assert_eq!(cookies, vec!["note=a%3Bb%0D%0AX-Injected:%201"]);
        assert!(outgoing.headers.get("X-Injected").is_none());
    }

    #[tokio::test]
    async fn test_session_persisted_before_delivery() {
        let store = Arc::new(MemorySessionStore::new());
        let mut ambient = ambient(store.clone());
        ambient.session_mut().prime(Some("abc"));
        ambient.start_session().unwrap();
        ambient.session_mut().active_mut().unwrap().insert("user", "ada");

        let mut frames: Vec<StreamFrame> = Vec::new();
        let mut sink = StreamingSink::new(&mut frames);
        ResponseMapper::new()
            .map(NativeResponse::ok("ok"), &mut ambient, &mut sink)
            .await;

        assert!(!ambient.session().is_active());
        let id = resident_session::SessionId::new("abc");
        assert_eq!(store.load(&id).unwrap().unwrap()["user"], "ada");
    }

    #[tokio::test]
    async fn test_streamed_body_pushed_in_order() {
        let mut ambient = ambient(Arc::new(MemorySessionStore::new()));
        let chunks = vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()];
        let response = NativeResponse::streamed_chunks(StatusCode::OK, chunks)
            .with_header("Content-Type", "text/plain");

        let mut frames: Vec<StreamFrame> = Vec::new();
        let mut sink = StreamingSink::new(&mut frames);
        let outgoing = ResponseMapper::new().map(response, &mut ambient, &mut sink).await;
        drop(sink);

        assert_eq!(
            outgoing.body,
            OutgoingBody::Streamed {
                chunks: 3,
                bytes: 11,
                complete: true,
            }
        );
        assert_eq!(frames.len(), 5);
        match &frames[0] {
            StreamFrame::Head { status, headers } => {
                assert_eq!(*status, StatusCode::OK);
                assert_eq!(headers.get("content-type"), Some("text/plain"));
            }
            other => panic!("expected head, got {other:?}"),
        }
        assert_eq!(frames[1], StreamFrame::Data(b"one".to_vec()));
        assert_eq!(frames[3], StreamFrame::Data(b"three".to_vec()));
        assert_eq!(frames[4], StreamFrame::End);
    }

    #[tokio::test]
    async fn test_panicking_producer_leaves_stream_incomplete() {
        let mut ambient = ambient(Arc::new(MemorySessionStore::new()));
        let mut produced = 0;
        let response = NativeResponse::streamed(StatusCode::OK, move || {
            produced += 1;
            if produced > 1 {
                panic!("generator exhausted");
            }
            Some(b"first".to_vec())
        });

        let mut frames: Vec<StreamFrame> = Vec::new();
        let mut sink = StreamingSink::new(&mut frames);
        let outgoing = ResponseMapper::new().map(response, &mut ambient, &mut sink).await;
        drop(sink);

        assert_eq!(
            outgoing.body,
            OutgoingBody::Streamed {
                chunks: 1,
                bytes: 5,
                complete: false,
            }
        );
        assert!(!frames.contains(&StreamFrame::End));
    }
}
