//! CSRF token lookup for unsafe requests

use reqwest::cookie::{CookieStore, Jar};
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Cookie the backend stores its CSRF token in
pub const CSRF_COOKIE_NAME: &str = "csrftoken";

/// Header the backend expects the token in
pub const CSRF_HEADER_NAME: &str = "X-CSRFToken";

/// Where the CSRF token for a request comes from
#[derive(Clone, Default)]
pub enum CsrfSource {
    #[default]
    None,
    /// A fixed token
    Token(String),
    /// Read from the session cookie jar on every request
    Cookie { jar: Arc<Jar>, cookie_name: String },
}

impl CsrfSource {
    /// Read `csrftoken` from `jar`
    pub fn from_jar(jar: Arc<Jar>) -> Self {
        CsrfSource::Cookie {
            jar,
            cookie_name: CSRF_COOKIE_NAME.to_string(),
        }
    }

    /// Token to send with a request to `url`, if any
    pub fn token_for(&self, url: &Url) -> Option<String> {
        match self {
            CsrfSource::None => None,
            CsrfSource::Token(token) => Some(token.clone()),
            CsrfSource::Cookie { jar, cookie_name } => {
                let header = jar.cookies(url)?;
                let header = header.to_str().ok()?;
                cookie_value(header, cookie_name)
            }
        }
    }
}

impl fmt::Debug for CsrfSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CsrfSource::None => f.write_str("CsrfSource::None"),
            CsrfSource::Token(_) => f.write_str("CsrfSource::Token(..)"),
            CsrfSource::Cookie { cookie_name, .. } => {
                write!(f, "CsrfSource::Cookie({})", cookie_name)
            }
        }
    }
}

/// Value of `name` in a `Cookie` header (`a=1; csrftoken=abc`)
pub(crate) fn cookie_value(header: &str, name: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
}
