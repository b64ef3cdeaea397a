//! Configuration options for the Penn Clubs client

use clubs_rust_rest::{UpdateMethod, CSRF_COOKIE_NAME, CSRF_HEADER_NAME};
use std::time::Duration;

/// Configuration options for the Penn Clubs client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Path of the REST API under the site URL
    pub api_prefix: String,

    /// Path of the WebSocket endpoints under the site URL
    pub socket_prefix: String,

    /// The request timeout
    pub request_timeout: Option<Duration>,

    /// Method used to update an existing instance
    pub update_method: UpdateMethod,

    /// Cookie holding the CSRF token
    pub csrf_cookie_name: String,

    /// Header the CSRF token is sent in
    pub csrf_header_name: String,

    /// Fixed CSRF token, used instead of the cookie when set
    pub csrf_token: Option<String>,

    /// Value of the `X-Client-Info` header
    pub client_info: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_prefix: "/api".to_string(),
            socket_prefix: "/api/ws".to_string(),
            request_timeout: Some(Duration::from_secs(30)),
            update_method: UpdateMethod::Patch,
            csrf_cookie_name: CSRF_COOKIE_NAME.to_string(),
            csrf_header_name: CSRF_HEADER_NAME.to_string(),
            csrf_token: None,
            client_info: format!("clubs-rust/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientOptions {
    /// Set the API path prefix
    pub fn with_api_prefix(mut self, value: &str) -> Self {
        self.api_prefix = value.to_string();
        self
    }

    /// Set the WebSocket path prefix
    pub fn with_socket_prefix(mut self, value: &str) -> Self {
        self.socket_prefix = value.to_string();
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Use PUT instead of PATCH for updates
    pub fn with_update_method(mut self, value: UpdateMethod) -> Self {
        self.update_method = value;
        self
    }

    /// Set the CSRF cookie name
    pub fn with_csrf_cookie_name(mut self, value: &str) -> Self {
        self.csrf_cookie_name = value.to_string();
        self
    }

    /// Set the CSRF header name
    pub fn with_csrf_header_name(mut self, value: &str) -> Self {
        self.csrf_header_name = value.to_string();
        self
    }

    /// Send a fixed CSRF token
    pub fn with_csrf_token(mut self, value: &str) -> Self {
        self.csrf_token = Some(value.to_string());
        self
    }

    /// Set the client info header
    pub fn with_client_info(mut self, value: &str) -> Self {
        self.client_info = value.to_string();
        self
    }
}
