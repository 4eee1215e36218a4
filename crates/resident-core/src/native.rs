//! The hosted application's own request and response representation.

use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use http::{Method, StatusCode};
use serde_json::{Map, Value};

use crate::cookie::ResponseCookie;
use crate::headers::{header_names, Headers};
use crate::request::UploadStatus;
use crate::trust::TrustPolicy;

/// An uploaded file after it was written to local storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFileDescriptor {
    /// Client-supplied filename.
    pub client_filename: String,
    /// Declared media type.
    pub media_type: String,
    /// Declared size in bytes.
    pub size: u64,
    /// Upload status.
    pub status: UploadStatus,
    /// Temporary copy on local storage.
    pub path: PathBuf,
}

impl UploadedFileDescriptor {
    /// Path of the temporary copy.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move the temporary copy somewhere permanent.
    ///
    /// Once moved, the end-of-request cleanup finds nothing to delete, which
    /// it treats as success.
    pub async fn move_to(&self, destination: impl AsRef<Path>) -> std::io::Result<()> {
        tokio::fs::rename(&self.path, destination).await
    }
}

/// Everything the request mapper extracted from the transport request.
#[derive(Debug, Clone, Default)]
pub struct RequestParts {
    /// HTTP method.
    pub method: Method,
    /// Request path.
    pub path: String,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// Form parameters (urlencoded body or multipart fields).
    pub form: Vec<(String, String)>,
    /// Request cookies.
    pub cookies: Vec<(String, String)>,
    /// Files by form field; `None` marks a field where no file was supplied.
    pub files: Vec<(String, Option<UploadedFileDescriptor>)>,
    /// Request headers.
    pub headers: Headers,
    /// Raw body.
    pub body: Vec<u8>,
    /// Peer address.
    pub remote_addr: Option<IpAddr>,
    /// Proxy and host trust settings in effect for this worker.
    pub trust: TrustPolicy,
}

/// Constructor used to turn mapped parts into a native request.
pub type RequestConstructor = fn(RequestParts) -> NativeRequest;

/// A native request as seen by the hosted application.
#[derive(Debug, Clone)]
pub struct NativeRequest {
    /// Name of the request flavour that built this value.
    pub class: &'static str,
    /// Free-form attributes for the application's own use.
    pub attributes: Map<String, Value>,
    parts: RequestParts,
}

impl NativeRequest {
    /// Flavour name of requests built by [`NativeRequest::from_parts`].
    pub const DEFAULT_CLASS: &'static str = "default";

    /// The default request constructor.
    pub fn from_parts(parts: RequestParts) -> Self {
        Self::with_class(Self::DEFAULT_CLASS, parts)
    }

    /// Build a request of a named flavour.
    pub fn with_class(class: &'static str, parts: RequestParts) -> Self {
        Self {
            class,
            attributes: Map::new(),
            parts,
        }
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    /// Request path.
    pub fn path(&self) -> &str {
        &self.parts.path
    }

    /// First query value for `name`.
    pub fn query(&self, name: &str) -> Option<&str> {
        lookup(&self.parts.query, name)
    }

    /// All query parameters.
    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.parts.query
    }

    /// First form value for `name`.
    pub fn form(&self, name: &str) -> Option<&str> {
        lookup(&self.parts.form, name)
    }

    /// All form parameters.
    pub fn form_pairs(&self) -> &[(String, String)] {
        &self.parts.form
    }

    /// Cookie value for `name`. Later duplicates win.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.parts
            .cookies
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// All cookies.
    pub fn cookies(&self) -> &[(String, String)] {
        &self.parts.cookies
    }

    /// Uploaded files in form order.
    pub fn files(&self) -> &[(String, Option<UploadedFileDescriptor>)] {
        &self.parts.files
    }

    /// The file posted under `field`, if one was supplied.
    pub fn file(&self, field: &str) -> Option<&UploadedFileDescriptor> {
        self.parts
            .files
            .iter()
            .find(|(k, _)| k == field)
            .and_then(|(_, f)| f.as_ref())
    }

    /// Request headers.
    pub fn headers(&self) -> &Headers {
        &self.parts.headers
    }

    /// Raw body.
    pub fn body(&self) -> &[u8] {
        &self.parts.body
    }

    /// Body as UTF-8 text, lossy.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.parts.body).into_owned()
    }

    /// Parse the body as JSON.
    pub fn json(&self) -> serde_json::Result<Value> {
        serde_json::from_slice(&self.parts.body)
    }

    /// The originating client address.
    ///
    /// `X-Forwarded-For` is only consulted when the peer is a trusted proxy;
    /// the chain is walked from the right, skipping further trusted proxies.
    pub fn client_ip(&self) -> Option<IpAddr> {
        let peer = self.parts.remote_addr?;
        if !self.parts.trust.is_trusted_proxy(&peer) {
            return Some(peer);
        }

        let forwarded: Vec<IpAddr> = self
            .parts
            .headers
            .get_all(header_names::X_FORWARDED_FOR)
            .flat_map(|v| v.split(','))
            .filter_map(|ip| ip.trim().parse().ok())
            .collect();

        forwarded
            .into_iter()
            .rev()
            .find(|ip| !self.parts.trust.is_trusted_proxy(ip))
            .or(Some(peer))
    }

    /// Host the request was addressed to, without a port.
    ///
    /// Bracketed IPv6 literals keep their brackets.
    pub fn host(&self) -> Option<&str> {
        let host = self.parts.headers.get(header_names::HOST)?.trim();
        if host.starts_with('[') {
            return Some(host.find(']').map_or(host, |end| &host[..=end]));
        }
        match host.rsplit_once(':') {
            Some((name, port))
                if !name.contains(':') && port.bytes().all(|b| b.is_ascii_digit()) =>
            {
                Some(name)
            }
            _ => Some(host),
        }
    }

    /// Whether the `Host` header passes the trusted host list.
    pub fn is_trusted_host(&self) -> bool {
        match self.host() {
            Some(host) => self.parts.trust.is_trusted_host(host),
            None => self.parts.trust.trusted_hosts.is_empty(),
        }
    }

    /// The mapped parts.
    pub fn parts(&self) -> &RequestParts {
        &self.parts
    }
}

fn lookup<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Produces the next chunk of a streamed body, or `None` when done.
pub type BodyProducer = Box<dyn FnMut() -> Option<Vec<u8>> + Send>;

/// Body of a native response.
pub enum NativeBody {
    /// Content fully known up front.
    Buffered(Vec<u8>),
    /// Content produced incrementally.
    Streamed(BodyProducer),
}

impl fmt::Debug for NativeBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffered(bytes) => write!(f, "Buffered({} bytes)", bytes.len()),
            Self::Streamed(_) => write!(f, "Streamed(..)"),
        }
    }
}

/// A native response returned by the hosted application.
#[derive(Debug)]
pub struct NativeResponse {
    /// Status code.
    pub status: StatusCode,
    /// Headers attached to the response object.
    pub headers: Headers,
    /// Cookies attached to the response object.
    pub cookies: Vec<ResponseCookie>,
    /// Body.
    pub body: NativeBody,
}

impl NativeResponse {
    /// A buffered response.
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Headers::new(),
            cookies: Vec::new(),
            body: NativeBody::Buffered(body.into()),
        }
    }

    /// A 200 response with a text body.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(StatusCode::OK, body)
    }

    /// A streamed response driven by `producer`.
    pub fn streamed<F>(status: StatusCode, producer: F) -> Self
    where
        F: FnMut() -> Option<Vec<u8>> + Send + 'static,
    {
        Self {
            status,
            headers: Headers::new(),
            cookies: Vec::new(),
            body: NativeBody::Streamed(Box::new(producer)),
        }
    }

    /// A streamed response that yields the given chunks in order.
    pub fn streamed_chunks(status: StatusCode, chunks: Vec<Vec<u8>>) -> Self {
        let mut chunks = chunks.into_iter();
        Self::streamed(status, move || chunks.next())
    }

    /// Attach a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Attach a cookie.
    pub fn with_cookie(mut self, cookie: ResponseCookie) -> Self {
        self.cookies.push(cookie);
        self
    }

    /// Whether the body is streamed.
    pub fn is_streamed(&self) -> bool {
        matches!(self.body, NativeBody::Streamed(_))
    }
}
