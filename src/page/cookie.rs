//! Cookie model and per-session cookie jar.
//!
//! A [`Cookie`] performs its own domain/path/secure matching against request
//! URLs, serializes into `Cookie` header form, and can be synthesized from a
//! `Set-Cookie` response header. The [`CookieJar`] is an insertion-ordered
//! collection with name uniqueness, owned exclusively by one page session.
//!
//! # Matching Rules
//!
//! - Domain `.example.com` matches `example.com` and any subdomain; a bare
//!   host matches only that exact host.
//! - Path matching is prefix-based: `/test/` matches `/test/foo`, not `/`.
//! - A `secure` cookie matches only `https` URLs.
//!
//! # Example
//!
//! ```ignore
//! use tabpilot::Cookie;
//!
//! let cookie = Cookie::new("session", "abc123")?
//!     .with_domain(".example.com")
//!     .with_path("/app/");
//! assert!(cookie.matches(&"https://www.example.com/app/login".parse()?));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Cookie
// ============================================================================

/// One HTTP cookie.
///
/// Construct with [`Cookie::new`] (explicit) or [`Cookie::parse`] (from a
/// `Set-Cookie` header); both reject nameless cookies with
/// [`Error::InvalidCookie`]. Cookies are never mutated in place - a jar
/// replaces by removing the old entry and inserting the new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cookie {
    /// Cookie name.
    pub name: String,

    /// Cookie value.
    pub value: String,

    /// Domain scope. A leading dot matches subdomains; empty matches any
    /// host (the jar is already scoped to one session).
    pub domain: String,

    /// Path scope (prefix match). Defaults to `/`.
    pub path: String,

    /// Only sent over https.
    pub secure: bool,

    /// Hidden from page script.
    pub httponly: bool,

    /// Absolute expiry time; `None` means a session cookie.
    pub expires: Option<DateTime<Utc>>,
}

// ============================================================================
// Cookie - Construction
// ============================================================================

impl Cookie {
    /// Creates a cookie with explicit name and value.
    ///
    /// Defaults: `path = "/"`, `httponly = true`, `secure = false`, no
    /// expiry, empty domain (matches any host).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCookie`] if `name` or `value` is empty.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let value = value.into();

        if name.is_empty() {
            return Err(Error::invalid_cookie("missing name"));
        }
        if value.is_empty() {
            return Err(Error::invalid_cookie("missing value"));
        }

        Ok(Self {
            name,
            value,
            domain: String::new(),
            path: "/".to_string(),
            secure: false,
            httponly: true,
            expires: None,
        })
    }

    /// Sets the domain scope.
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into().to_ascii_lowercase();
        self
    }

    /// Sets the path scope.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the secure flag.
    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Sets the httponly flag.
    #[must_use]
    pub fn with_httponly(mut self, httponly: bool) -> Self {
        self.httponly = httponly;
        self
    }

    /// Sets the absolute expiry time.
    #[must_use]
    pub fn with_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }
}

// ============================================================================
// Cookie - Parsing
// ============================================================================

impl Cookie {
    /// Parses a single `Set-Cookie` header value against the response URL.
    ///
    /// The first `name=value` pair is mandatory. `path`, `domain`, `expires`,
    /// `secure` and `HttpOnly` attributes are recognized case-insensitively.
    /// The domain defaults to the response host (no leading dot). A response
    /// that was not itself https can never mint a `secure` cookie, whatever
    /// the header claims.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCookie`] if the first pair is missing or has
    /// no name.
    pub fn parse(header_value: &str, response_url: &Url) -> Result<Self> {
        let mut segments = header_value.split(';');

        let first = segments
            .next()
            .ok_or_else(|| Error::invalid_cookie("empty Set-Cookie header"))?;
        let (name, value) = first
            .split_once('=')
            .ok_or_else(|| Error::invalid_cookie("missing name=value pair"))?;
        let name = name.trim();
        let value = value.trim();

        if name.is_empty() {
            return Err(Error::invalid_cookie("missing name"));
        }

        let mut cookie = Self {
            name: name.to_string(),
            value: value.to_string(),
            domain: response_url
                .host_str()
                .unwrap_or_default()
                .to_ascii_lowercase(),
            path: "/".to_string(),
            secure: false,
            httponly: false,
            expires: None,
        };

        for segment in segments {
            let segment = segment.trim();
            match segment.split_once('=') {
                Some((key, attr)) => match key.trim().to_ascii_lowercase().as_str() {
                    "path" => {
                        let attr = attr.trim();
                        if !attr.is_empty() {
                            cookie.path = attr.to_string();
                        }
                    }
                    "domain" => {
                        let attr = attr.trim();
                        if !attr.is_empty() {
                            cookie.domain = attr.to_ascii_lowercase();
                        }
                    }
                    "expires" => match parse_http_date(attr.trim()) {
                        Some(when) => cookie.expires = Some(when),
                        None => {
                            debug!(value = %attr.trim(), "Unparseable cookie expiry, ignored");
                        }
                    },
                    _ => {}
                },
                None => match segment.to_ascii_lowercase().as_str() {
                    "secure" => cookie.secure = true,
                    "httponly" => cookie.httponly = true,
                    _ => {}
                },
            }
        }

        // A plaintext response cannot mark its cookie secure.
        if response_url.scheme() != "https" {
            cookie.secure = false;
        }

        Ok(cookie)
    }
}

// ============================================================================
// Cookie - Matching
// ============================================================================

impl Cookie {
    /// Returns `true` iff this cookie applies to the given URL.
    ///
    /// The URL's host must satisfy the domain rule, its path must start with
    /// the cookie's path, and a `secure` cookie requires the `https` scheme.
    #[must_use]
    pub fn matches(&self, url: &Url) -> bool {
        let host = url.host_str().unwrap_or_default();

        if !domain_matches(&self.domain, host) {
            return false;
        }
        if !url.path().starts_with(&self.path) {
            return false;
        }
        if self.secure && url.scheme() != "https" {
            return false;
        }
        true
    }

    /// Returns `true` if the cookie has expired at `now`.
    ///
    /// Session cookies (no expiry) never expire.
    #[inline]
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|when| when <= now)
    }

    /// Serializes into the `name=value` request header fragment.
    #[inline]
    #[must_use]
    pub fn pair(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

impl fmt::Display for Cookie {
    /// External inspection form: `name=value; domain=D; path=P`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={}; domain={}; path={}",
            self.name, self.value, self.domain, self.path
        )
    }
}

// ============================================================================
// Domain / Date Helpers
// ============================================================================

/// Applies the leading-dot domain rule.
///
/// `.example.com` matches `example.com` and any subdomain of it; a bare
/// domain matches only the exact host. An empty domain matches anything.
fn domain_matches(domain: &str, host: &str) -> bool {
    if domain.is_empty() {
        return true;
    }
    let host = host.to_ascii_lowercase();
    match domain.strip_prefix('.') {
        Some(bare) => host == bare || host.ends_with(&format!(".{bare}")),
        None => host == domain,
    }
}

/// HTTP-date formats accepted for the `expires` attribute, after the
/// RFC 2822 fast path: RFC 850 and asctime.
const HTTP_DATE_FORMATS: &[&str] = &[
    "%A, %d-%b-%y %H:%M:%S GMT",
    "%A, %d-%b-%Y %H:%M:%S GMT",
    "%a %b %e %H:%M:%S %Y",
];

/// Parses an HTTP-date in any of its three classic shapes.
fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(when) = DateTime::parse_from_rfc2822(value) {
        return Some(when.with_timezone(&Utc));
    }
    for format in HTTP_DATE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

// ============================================================================
// CookieJar
// ============================================================================

/// Insertion-ordered cookie collection with name uniqueness.
///
/// Owned exclusively by one page session. Adding a cookie whose name already
/// exists removes the old entry first, so the replacement lands at the end
/// of the serialization order.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
}

impl CookieJar {
    /// Creates an empty jar.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a cookie, replacing any existing cookie with the same name.
    pub fn add(&mut self, cookie: Cookie) {
        self.cookies.retain(|c| c.name != cookie.name);
        self.cookies.push(cookie);
    }

    /// Removes a cookie by name.
    ///
    /// Returns `true` if a cookie was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.cookies.len();
        self.cookies.retain(|c| c.name != name);
        self.cookies.len() != before
    }

    /// Removes all cookies.
    #[inline]
    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    /// Returns the cookies in insertion order.
    #[inline]
    #[must_use]
    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    /// Looks up a cookie by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Cookie> {
        self.cookies.iter().find(|c| c.name == name)
    }

    /// Returns the number of cookies in the jar.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// Returns `true` if the jar is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Builds the `Cookie` request header value for a URL.
    ///
    /// Matching, unexpired cookies in jar order, joined as
    /// `name1=value1; name2=value2`. Returns `None` when nothing matches.
    #[must_use]
    pub fn header_for(&self, url: &Url) -> Option<String> {
        let now = Utc::now();
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .filter(|c| !c.is_expired(now) && c.matches(url))
            .map(Cookie::pair)
            .collect();

        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    /// Parses a `Set-Cookie` header against the response URL and stores the
    /// result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCookie`] if the header is malformed; nothing
    /// is stored in that case.
    pub fn set_from_header(&mut self, header_value: &str, response_url: &Url) -> Result<()> {
        let cookie = Cookie::parse(header_value, response_url)?;
        debug!(cookie = %cookie, "Cookie harvested from response");
        self.add(cookie);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
