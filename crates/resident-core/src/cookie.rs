//! Request cookie parsing and response cookie serialization.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A cookie that cannot be written to a `Set-Cookie` header.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CookieError {
    /// The name is empty or not an HTTP token.
    #[error("invalid cookie name {0:?}")]
    InvalidName(String),

    /// An attribute value would break out of its attribute.
    #[error("invalid cookie {attribute} {value:?}")]
    InvalidAttribute {
        attribute: &'static str,
        value: String,
    },
}

/// Parse one `Cookie` header value into name/value pairs.
///
/// Pairs are split on `;` and trimmed. A pair without `=` is skipped rather
/// than failing the whole header; values are split on the first `=` only so
/// base64 padding survives. Percent escapes in values are decoded.
pub fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), percent_decode(value.trim())))
        })
        .collect()
}

/// Whether `name` is an RFC 6265 cookie name (an HTTP token).
pub fn is_valid_cookie_name(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b)
        })
}

fn is_cookie_octet(b: u8) -> bool {
    matches!(b, 0x21 | 0x23..=0x2B | 0x2D..=0x3A | 0x3C..=0x5B | 0x5D..=0x7E)
}

/// Escape every byte outside the cookie-octet set, and `%` itself.
fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        if is_cookie_octet(b) && b != b'%' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

fn percent_decode(value: &str) -> String {
    if !value.contains('%') {
        return value.to_string();
    }
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            out.push(hex_value(bytes[i + 1]) << 4 | hex_value(bytes[i + 2]));
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}

fn check_attribute(attribute: &'static str, value: &str) -> Result<(), CookieError> {
    if value.bytes().any(|b| b.is_ascii_control() || b == b';') {
        return Err(CookieError::InvalidAttribute {
            attribute,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// `SameSite` attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => write!(f, "Strict"),
            Self::Lax => write!(f, "Lax"),
            Self::None => write!(f, "None"),
        }
    }
}

/// A cookie attached to a native response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseCookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value, percent-encoded when serialized.
    pub value: String,
    /// `Path` attribute.
    pub path: Option<String>,
    /// `Domain` attribute.
    pub domain: Option<String>,
    /// `Expires` attribute.
    pub expires: Option<DateTime<Utc>>,
    /// `Max-Age` attribute in seconds.
    pub max_age: Option<i64>,
    /// `Secure` flag.
    pub secure: bool,
    /// `HttpOnly` flag.
    pub http_only: bool,
    /// `SameSite` attribute.
    pub same_site: Option<SameSite>,
}

impl ResponseCookie {
    /// Create a cookie with only a name and value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
            domain: None,
            expires: None,
            max_age: None,
            secure: false,
            http_only: false,
            same_site: None,
        }
    }

    /// Set the path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the domain.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Set the expiry instant.
    pub fn with_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Set max-age in seconds.
    pub fn with_max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    /// Mark the cookie secure.
    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    /// Mark the cookie http-only.
    pub fn http_only(mut self) -> Self {
        self.http_only = true;
        self
    }

    /// Set the same-site policy.
    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    /// Serialize into a `Set-Cookie` header value.
    ///
    /// Attribute order is fixed: Path, Domain, Expires, Max-Age, Secure,
    /// HttpOnly, SameSite. The value is percent-encoded; a name that is not
    /// a token or a path or domain that could end its attribute is refused.
    pub fn to_header_value(&self) -> Result<String, CookieError> {
        if !is_valid_cookie_name(&self.name) {
            return Err(CookieError::InvalidName(self.name.clone()));
        }
        let mut out = format!("{}={}", self.name, percent_encode(&self.value));

        if let Some(path) = self.path.as_deref().filter(|p| !p.is_empty()) {
            check_attribute("path", path)?;
            out.push_str("; Path=");
            out.push_str(path);
        }
        if let Some(domain) = self.domain.as_deref().filter(|d| !d.is_empty()) {
            check_attribute("domain", domain)?;
            out.push_str("; Domain=");
            out.push_str(domain);
        }
        if let Some(expires) = self.expires {
            out.push_str("; Expires=");
            out.push_str(&format_cookie_date(expires));
        }
        if let Some(max_age) = self.max_age {
            out.push_str(&format!("; Max-Age={}", max_age));
        }
        if self.secure {
            out.push_str("; Secure");
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        if let Some(same_site) = self.same_site {
            out.push_str(&format!("; SameSite={}", same_site));
        }

        Ok(out)
    }
}

/// Format an instant the way cookie `Expires` attributes expect.
pub fn format_cookie_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d-%b-%Y %H:%M:%S GMT").to_string()
}
