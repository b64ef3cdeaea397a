//! Penn Clubs Rust Client Library
//!
//! Schema-driven create/read/update/delete for the sub-resources managed on
//! the Penn Clubs admin pages (advisors, events, members, invites...), plus
//! the WebSocket client behind the chat widget and script console.
//!
//! A [`FieldSchema`](clubs_rust_schema::FieldSchema) describes the editable
//! fields; a [`FormController`](form::FormController) runs one create or
//! edit against a [`CollectionSync`](collection::CollectionSync), which keeps
//! the cached list in step with the server; a
//! [`ResourceTable`](table::ResourceTable) renders that list.

pub mod approval;
pub mod collection;
pub mod config;
pub mod error;
pub mod form;
pub mod memberships;
pub mod table;

pub use clubs_rust_realtime as realtime;
pub use clubs_rust_rest as rest;
pub use clubs_rust_schema as schema;

use std::sync::Arc;

use clubs_rust_realtime::{SocketClient, SocketClientOptions};
use clubs_rust_rest::{CsrfSource, KeyField, ResourceClient};
use clubs_rust_schema::FieldSchema;
use log::debug;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use url::Url;

use crate::collection::CollectionSync;
use crate::config::ClientOptions;
use crate::error::Error;
use crate::form::FormController;
use crate::memberships::{MembershipCapabilities, MembershipList};

/// The main entry point for the Penn Clubs client
pub struct Clubs {
    /// The site URL (`https://pennclubs.com`)
    pub url: String,
    /// HTTP client used for requests; shares `cookie_jar`
    pub http_client: Client,
    /// Session and CSRF cookies
    pub cookie_jar: Arc<Jar>,
    /// Client options
    pub options: ClientOptions,
}

impl Clubs {
    /// Create a new client
    ///
    /// # Example
    ///
    /// ```
    /// use clubs_rust::Clubs;
    ///
    /// let clubs = Clubs::new("https://pennclubs.com").unwrap();
    /// assert_eq!(clubs.api_root(), "https://pennclubs.com/api");
    /// ```
    pub fn new(site_url: &str) -> Result<Self, Error> {
        Self::new_with_options(site_url, ClientOptions::default())
    }

    /// Create a new client with custom options
    ///
    /// # Example
    ///
    /// ```
    /// use clubs_rust::{Clubs, config::ClientOptions};
    /// use clubs_rust::rest::UpdateMethod;
    ///
    /// let options = ClientOptions::default().with_update_method(UpdateMethod::Put);
    /// let clubs = Clubs::new_with_options("https://pennclubs.com", options).unwrap();
    /// ```
    pub fn new_with_options(site_url: &str, options: ClientOptions) -> Result<Self, Error> {
        Url::parse(site_url)?;

        let mut headers = HeaderMap::new();
        let client_info = HeaderValue::from_str(&options.client_info)
            .map_err(|_| Error::general(format!("Invalid client info: {}", options.client_info)))?;
        headers.insert("X-Client-Info", client_info);

        let cookie_jar = Arc::new(Jar::default());
        let mut builder = Client::builder()
            .cookie_provider(cookie_jar.clone())
            .default_headers(headers);
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build()?;
        debug!("Penn Clubs client for {}", site_url);

        Ok(Self {
            url: site_url.trim_end_matches('/').to_string(),
            http_client,
            cookie_jar,
            options,
        })
    }

    /// `<site>/api`
    pub fn api_root(&self) -> String {
        format!(
            "{}/{}",
            self.url,
            self.options.api_prefix.trim_matches('/')
        )
    }

    /// Store a cookie (e.g. the session cookie from a login elsewhere)
    pub fn add_cookie(&self, cookie: &str) -> Result<(), Error> {
        let url = Url::parse(&self.url)?;
        self.cookie_jar.add_cookie_str(cookie, &url);
        Ok(())
    }

    /// CSRF source for unsafe requests: the fixed token from the options,
    /// otherwise the cookie jar
    pub fn csrf(&self) -> CsrfSource {
        match &self.options.csrf_token {
            Some(token) => CsrfSource::Token(token.clone()),
            None => CsrfSource::Cookie {
                jar: self.cookie_jar.clone(),
                cookie_name: self.options.csrf_cookie_name.clone(),
            },
        }
    }

    /// Client for one REST resource, e.g. `clubs/pennlabs/advisors`
    pub fn resource(&self, path: &str) -> Result<ResourceClient, Error> {
        Ok(
            ResourceClient::new(&self.api_root(), path, self.http_client.clone())?
                .with_csrf(self.csrf())
                .with_csrf_header(&self.options.csrf_header_name)
                .with_update_method(self.options.update_method),
        )
    }

    /// Synchronized collection of `path`, keyed by `key_field`
    pub fn collection(&self, path: &str, key_field: &str) -> Result<CollectionSync, Error> {
        let client = self.resource(path)?.with_key_field(KeyField::new(key_field));
        Ok(CollectionSync::new(client))
    }

    /// Form controller over a fresh collection of `path`
    pub fn form(
        &self,
        path: &str,
        key_field: &str,
        schema: FieldSchema,
    ) -> Result<FormController, Error> {
        let sync = self.collection(path, key_field)?;
        Ok(FormController::new(Arc::new(schema), sync))
    }

    /// Memberships of `username`
    pub fn memberships(
        &self,
        username: &str,
        capabilities: MembershipCapabilities,
    ) -> Result<MembershipList, Error> {
        Ok(MembershipList::new(
            self.resource("memberships")?,
            self.resource("clubs")?.with_key_field(KeyField::new("code")),
            username,
            capabilities,
        ))
    }

    /// WebSocket client for `/api/ws/<feature>/<id>/`
    pub fn socket(&self, feature: &str, id: &str) -> Result<SocketClient, Error> {
        let options = SocketClientOptions {
            path_prefix: self.options.socket_prefix.clone(),
            ..SocketClientOptions::default()
        };
        Ok(SocketClient::new_with_options(&self.url, feature, id, options)?)
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::approval::{ApprovalDiffs, FieldDiff};
    pub use crate::collection::{Collection, CollectionSync, MutationKind, PendingPatch};
    pub use crate::config::ClientOptions;
    pub use crate::error::Error;
    pub use crate::form::{FormController, FormPhase, FormSession, PreparedSubmit, SubmitOutcome};
    pub use crate::memberships::{Membership, MembershipCapabilities, MembershipList};
    pub use crate::table::{ActionOutcome, ResourceTable, RowAction, TableView};
    pub use crate::Clubs;
    pub use clubs_rust_rest::{InstanceKey, KeyField, RequestBody, ResourceInstance};
    pub use clubs_rust_schema::{ChoiceOption, FieldDescriptor, FieldKind, FieldSchema, FieldValue};
}
