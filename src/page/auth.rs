//! HTTP Basic authorization policy.
//!
//! Decides, per outgoing request, whether the session's credentials are
//! attached. The rule is strict origin scoping: the main-document request of
//! a credentialed session always carries `Authorization`, sub-resources only
//! when their scheme, host and port all equal the page's base URL. Third
//! party origins never see the credentials, and any pre-existing
//! `Authorization` header is cleared first so stale values cannot leak
//! across navigations.

// ============================================================================
// Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use url::Url;

// ============================================================================
// Credentials
// ============================================================================

/// Username and password bound to one page session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

impl Credentials {
    /// Creates a credential pair.
    #[inline]
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Encodes the pair as a `Basic` authorization header value.
    #[must_use]
    pub fn basic_header(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!("Basic {}", Base64Standard.encode(raw))
    }
}

// ============================================================================
// Policy
// ============================================================================

/// Applies the authorization policy to a request's header set.
///
/// Any pre-existing `Authorization` header is always removed. Credentials
/// are then attached iff:
///
/// - the request is the navigation's main document request, or
/// - the request URL's origin (scheme + host + port) equals the base URL's.
///
/// `base_url` is the URL of the page that initiated the request.
pub(crate) fn apply_authorization(
    headers: &mut Vec<(String, String)>,
    credentials: Option<&Credentials>,
    base_url: Option<&Url>,
    request_url: &Url,
    is_main_document: bool,
) -> bool {
    headers.retain(|(name, _)| !name.eq_ignore_ascii_case("authorization"));

    let Some(credentials) = credentials else {
        return false;
    };

    let allowed = is_main_document
        || base_url.is_some_and(|base| base.origin() == request_url.origin());

    if allowed {
        headers.push(("Authorization".to_string(), credentials.basic_header()));
    }
    allowed
}

// ============================================================================
// Tests
// ============================================================================
