//! Transport-neutral incoming request.

use std::fmt;
use std::net::IpAddr;

use futures::stream::BoxStream;
use futures::TryStreamExt;
use http::Method;
use serde::{Deserialize, Serialize};

use crate::cookie::parse_cookie_header;
use crate::headers::{header_names, Headers};

/// Upload status codes reported by the transport for each file part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// The file arrived intact.
    Ok,
    /// The part exceeded the transport's size limit.
    TooLarge,
    /// The part was cut off.
    Partial,
    /// The form field was present but no file was chosen.
    NoFile,
}

impl UploadStatus {
    /// Whether the part carries file content.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// An uploaded file as delivered by the transport, before it is materialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    /// Form field the file was posted under.
    pub field: String,
    /// Client-supplied filename.
    pub filename: String,
    /// Declared media type.
    pub media_type: String,
    /// Upload status.
    pub status: UploadStatus,
    /// File content.
    #[serde(default)]
    pub content: Vec<u8>,
}

impl UploadedFile {
    /// A file that arrived intact.
    pub fn ok(
        field: impl Into<String>,
        filename: impl Into<String>,
        media_type: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            field: field.into(),
            filename: filename.into(),
            media_type: media_type.into(),
            status: UploadStatus::Ok,
            content: content.into(),
        }
    }

    /// A part that reported an upload error.
    pub fn failed(field: impl Into<String>, filename: impl Into<String>, status: UploadStatus) -> Self {
        Self {
            field: field.into(),
            filename: filename.into(),
            media_type: String::new(),
            status,
            content: Vec::new(),
        }
    }

    /// Declared size in bytes.
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

/// Request body, either already buffered or still arriving.
pub enum RequestBody {
    /// Fully read body.
    Buffered(Vec<u8>),
    /// Body chunks still being read from the connection.
    Stream(BoxStream<'static, std::io::Result<Vec<u8>>>),
}

impl RequestBody {
    /// An empty body.
    pub fn empty() -> Self {
        Self::Buffered(Vec::new())
    }

    /// Read the whole body into memory.
    pub async fn collect(self) -> std::io::Result<Vec<u8>> {
        match self {
            Self::Buffered(bytes) => Ok(bytes),
            Self::Stream(stream) => {
                stream
                    .try_fold(Vec::new(), |mut acc, chunk| async move {
                        acc.extend_from_slice(&chunk);
                        Ok(acc)
                    })
                    .await
            }
        }
    }
}

impl Default for RequestBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffered(bytes) => write!(f, "Buffered({} bytes)", bytes.len()),
            Self::Stream(_) => write!(f, "Stream(..)"),
        }
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Buffered(bytes)
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        Self::Buffered(text.as_bytes().to_vec())
    }
}

/// A request as handed over by the transport adapter.
#[derive(Debug)]
pub struct IncomingRequest {
    /// HTTP method.
    pub method: Method,
    /// Request path, without the query string.
    pub path: String,
    /// Query parameters in the order they appeared.
    pub query: Vec<(String, String)>,
    /// Request headers.
    pub headers: Headers,
    /// Cookies already split out by the transport, if it does so.
    pub cookies: Vec<(String, String)>,
    /// Non-file multipart fields parsed by the transport.
    pub form_fields: Vec<(String, String)>,
    /// Request body.
    pub body: RequestBody,
    /// Uploaded files in form order.
    pub files: Vec<UploadedFile>,
    /// Peer address of the connection.
    pub remote_addr: Option<IpAddr>,
}

impl IncomingRequest {
    /// Create a request with no headers, query or body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Headers::new(),
            cookies: Vec::new(),
            form_fields: Vec::new(),
            body: RequestBody::empty(),
            files: Vec::new(),
            remote_addr: None,
        }
    }

    /// Shorthand for a GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Shorthand for a POST request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Build from a request target such as `/search?q=shoes&page=2`.
    pub fn from_target(method: Method, target: &str) -> Self {
        match target.split_once('?') {
            Some((path, query)) => {
                let mut request = Self::new(method, path);
                request.query = url::form_urlencoded::parse(query.as_bytes())
                    .into_owned()
                    .collect();
                request
            }
            None => Self::new(method, target),
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Add a query parameter.
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Add a cookie.
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = body.into();
        self
    }

    /// Add an uploaded file.
    pub fn with_file(mut self, file: UploadedFile) -> Self {
        self.files.push(file);
        self
    }

    /// Add a multipart form field.
    pub fn with_form_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form_fields.push((name.into(), value.into()));
        self
    }

    /// Set the peer address.
    pub fn with_remote_addr(mut self, addr: IpAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Every cookie on the request: transport-split cookies first, then the
    /// pairs parsed from each `Cookie` header.
    pub fn all_cookies(&self) -> Vec<(String, String)> {
        let mut cookies = self.cookies.clone();
        for header in self.headers.get_all(header_names::COOKIE) {
            cookies.extend(parse_cookie_header(header));
        }
        cookies
    }

    /// The declared content type, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(header_names::CONTENT_TYPE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_target_splits_query() {
        let request = IncomingRequest::from_target(Method::GET, "/search?q=red%20shoes&page=2");
        assert_eq!(request.path, "/search");
        assert_eq!(
            request.query,
            vec![
                ("q".to_string(), "red shoes".to_string()),
                ("page".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn test_all_cookies_merges_sources() {
        let request = IncomingRequest::get("/")
            .with_cookie("a", "1")
            .with_header("Cookie", "b=2; junk; c=3");
        let names: Vec<_> = request.all_cookies().into_iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_stream_body_collects_in_order() {
        let chunks = vec![Ok(b"he".to_vec()), Ok(b"llo".to_vec())];
        let body = RequestBody::Stream(Box::pin(futures::stream::iter(chunks)));
        assert_eq!(body.collect().await.unwrap(), b"hello".to_vec());
    }

    #[test]
    fn test_upload_status() {
        let ok = UploadedFile::ok("doc", "a.pdf", "application/pdf", b"%PDF".to_vec());
        assert!(ok.status.is_ok());
        assert_eq!(ok.size(), 4);
        let missing = UploadedFile::failed("doc", "", UploadStatus::NoFile);
        assert!(!missing.status.is_ok());
    }
}
