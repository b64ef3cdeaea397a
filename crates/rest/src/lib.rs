//! Penn Clubs REST client for Rust
//!
//! This crate talks to one REST resource of the Penn Clubs API, following
//! the backend's conventions:
//!
//! - collection URL `<api>/<resource>/`, instance URL `<api>/<resource>/<key>/`
//! - `?format=json` on every request
//! - JSON bodies, `multipart/form-data` when a file is uploaded
//! - cookie session auth with the CSRF token from the `csrftoken` cookie sent
//!   back in `X-CSRFToken`
//! - rejected requests answer with `{field: message(s)}`

mod csrf;
mod error;
mod fetch;
mod instance;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde_json::{Map, Value};
use std::collections::HashSet;
use url::Url;

pub use csrf::{CsrfSource, CSRF_COOKIE_NAME, CSRF_HEADER_NAME};
pub use error::{format_response, ApiErrorBody, RestError};
pub use fetch::{RequestBody, UploadPart};
pub use instance::{InstanceKey, KeyField, ResourceInstance};

use fetch::FetchBuilder;

/// HTTP method used for updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateMethod {
    #[default]
    Patch,
    Put,
}

impl UpdateMethod {
    fn method(&self) -> Method {
        match self {
            UpdateMethod::Patch => Method::PATCH,
            UpdateMethod::Put => Method::PUT,
        }
    }
}

/// Operations the collection synchronizer needs from a resource
#[async_trait]
pub trait ResourceApi: Send + Sync {
    /// Field that identifies instances of this resource
    fn key_field(&self) -> &KeyField;

    async fn list(&self) -> Result<Vec<ResourceInstance>, RestError>;

    async fn create(&self, body: RequestBody) -> Result<ResourceInstance, RestError>;

    async fn update(
        &self,
        key: &InstanceKey,
        body: RequestBody,
    ) -> Result<ResourceInstance, RestError>;

    async fn delete(&self, key: &InstanceKey) -> Result<(), RestError>;
}

/// Client for one REST resource
#[derive(Debug, Clone)]
pub struct ResourceClient {
    base_url: Url,
    http_client: Client,
    headers: HeaderMap,
    query_params: Vec<(String, String)>,
    key_field: KeyField,
    csrf: CsrfSource,
    csrf_header: String,
    update_method: UpdateMethod,
}

impl ResourceClient {
    /// Create a client for `resource` (`clubs/abc/advisors`) under `api_root`
    /// (`https://pennclubs.com/api`)
    pub fn new(api_root: &str, resource: &str, http_client: Client) -> Result<Self, RestError> {
        let base_url = resource_url(api_root, resource)?;
        debug!("Resource client for {}", base_url);

        Ok(Self {
            base_url,
            http_client,
            headers: HeaderMap::new(),
            query_params: Vec::new(),
            key_field: KeyField::default(),
            csrf: CsrfSource::None,
            csrf_header: CSRF_HEADER_NAME.to_string(),
            update_method: UpdateMethod::default(),
        })
    }

    /// Identify instances by `key_field` instead of `id`
    pub fn with_key_field(mut self, key_field: KeyField) -> Self {
        self.key_field = key_field;
        self
    }

    pub fn with_csrf(mut self, csrf: CsrfSource) -> Self {
        self.csrf = csrf;
        self
    }

    pub fn with_csrf_header(mut self, header: &str) -> Self {
        self.csrf_header = header.to_string();
        self
    }

    pub fn with_update_method(mut self, update_method: UpdateMethod) -> Self {
        self.update_method = update_method;
        self
    }

    /// Send `key: value` with every request
    pub fn with_header(mut self, key: &str, value: &str) -> Result<Self, RestError> {
        let header_name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| RestError::InvalidParameters(format!("Invalid header name: {}", key)))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| RestError::InvalidParameters(format!("Invalid header value: {}", value)))?;
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Extra query parameter for list requests (`?bypass=true`)
    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query_params.push((key.to_string(), value.to_string()));
        self
    }

    pub fn key_field(&self) -> &KeyField {
        &self.key_field
    }

    pub fn update_method(&self) -> UpdateMethod {
        self.update_method
    }

    /// `<api>/<resource>/`
    pub fn collection_url(&self) -> &Url {
        &self.base_url
    }

    /// `<api>/<resource>/<key>/`, with the key percent-encoded as one segment
    pub fn instance_url(&self, key: &InstanceKey) -> Result<Url, RestError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RestError::InvalidParameters(format!("Cannot extend {}", self.base_url)))?
            .pop_if_empty()
            .push(&key.to_string())
            .push("");
        Ok(url)
    }

    /// Client for a resource nested under one instance
    /// (`clubs/` + `abc` + `members` -> `clubs/abc/members/`)
    pub fn nested(&self, key: &InstanceKey, resource: &str) -> Result<ResourceClient, RestError> {
        let mut base_url = self.instance_url(key)?;
        {
            let mut segments = base_url.path_segments_mut().map_err(|_| {
                RestError::InvalidParameters(format!("Cannot extend {}", self.base_url))
            })?;
            segments.pop_if_empty();
            for segment in resource.split('/').filter(|segment| !segment.is_empty()) {
                segments.push(segment);
            }
            segments.push("");
        }

        Ok(Self {
            base_url,
            http_client: self.http_client.clone(),
            headers: self.headers.clone(),
            query_params: Vec::new(),
            key_field: KeyField::default(),
            csrf: self.csrf.clone(),
            csrf_header: self.csrf_header.clone(),
            update_method: self.update_method,
        })
    }

    fn fetch(&self, url: Url, method: Method) -> Result<FetchBuilder<'_>, RestError> {
        let unsafe_method = !matches!(method, Method::GET | Method::HEAD | Method::OPTIONS);
        let fetch = FetchBuilder::new(&self.http_client, url, method).headers(&self.headers);

        if unsafe_method {
            if let Some(token) = self.csrf.token_for(fetch.url()) {
                return fetch.header(&self.csrf_header, &token);
            }
        }
        Ok(fetch)
    }

    /// Fetch every instance. Accepts a bare array or a paginated
    /// `{"results": [...], "next": ...}` envelope, following `next` until
    /// the last page.
    pub async fn list(&self) -> Result<Vec<ResourceInstance>, RestError> {
        let mut body: Value = self
            .fetch(self.base_url.clone(), Method::GET)?
            .query(&self.query_params)
            .execute()
            .await?;
        let mut items = Vec::new();
        let mut visited = HashSet::new();

        loop {
            let next = match body {
                Value::Array(page) => {
                    items.extend(page);
                    None
                }
                Value::Object(mut envelope) => {
                    match envelope.remove("results") {
                        Some(Value::Array(page)) => items.extend(page),
                        _ => {
                            return Err(RestError::DeserializationError(
                                "list response is neither an array nor a paginated envelope"
                                    .to_string(),
                            ))
                        }
                    }
                    match envelope.remove("next") {
                        Some(Value::String(next)) if !next.is_empty() => Some(next),
                        _ => None,
                    }
                }
                other => {
                    return Err(RestError::DeserializationError(format!(
                        "unexpected list response: {}",
                        other
                    )))
                }
            };

            let Some(next) = next else {
                break;
            };
            // `next` is usually absolute; join also resolves a relative one
            let url = self.base_url.join(&next)?;
            if !visited.insert(url.to_string()) {
                return Err(RestError::DeserializationError(format!(
                    "pagination loops back to {}",
                    url
                )));
            }
            debug!("Following next page {}", url);
            body = self.fetch(url, Method::GET)?.execute().await?;
        }

        let instances = items
            .into_iter()
            .map(ResourceInstance::from_value)
            .collect::<Result<Vec<_>, _>>()?;
        debug!("Listed {} instances from {}", instances.len(), self.base_url);
        Ok(instances)
    }

    pub async fn retrieve(&self, key: &InstanceKey) -> Result<ResourceInstance, RestError> {
        let url = self.instance_url(key)?;
        self.fetch(url, Method::GET)?.execute().await
    }

    /// POST `<api>/<resource>/`
    pub async fn create(&self, body: RequestBody) -> Result<ResourceInstance, RestError> {
        let (body, files) = body.split_empty_lists();
        let mut instance: ResourceInstance = self
            .fetch(self.base_url.clone(), Method::POST)?
            .body(body)
            .execute()
            .await?;
        if let Some(files) = files.filter(|files| !files.is_empty()) {
            let key = instance.key(&self.key_field).ok_or_else(|| {
                RestError::DeserializationError(format!(
                    "created instance has no {}",
                    self.key_field.name()
                ))
            })?;
            instance = self.upload_files(&key, files).await?;
        }
        info!(
            "Created {:?} under {}",
            instance.key(&self.key_field),
            self.base_url
        );
        Ok(instance)
    }

    /// PATCH (or PUT) `<api>/<resource>/<key>/`
    pub async fn update(
        &self,
        key: &InstanceKey,
        body: RequestBody,
    ) -> Result<ResourceInstance, RestError> {
        let (body, files) = body.split_empty_lists();
        let url = self.instance_url(key)?;
        let mut instance: ResourceInstance = self
            .fetch(url, self.update_method.method())?
            .body(body)
            .execute()
            .await?;
        if let Some(files) = files.filter(|files| !files.is_empty()) {
            let key = instance.key(&self.key_field).unwrap_or_else(|| key.clone());
            instance = self.upload_files(&key, files).await?;
        }
        info!("Updated {} under {}", key, self.base_url);
        Ok(instance)
    }

    /// PATCH only the files of a body whose fields were already sent as JSON
    async fn upload_files(
        &self,
        key: &InstanceKey,
        files: Vec<UploadPart>,
    ) -> Result<ResourceInstance, RestError> {
        debug!("Uploading {} file(s) to {} separately", files.len(), key);
        let url = self.instance_url(key)?;
        self.fetch(url, Method::PATCH)?
            .body(RequestBody::Multipart {
                fields: Map::new(),
                files,
            })
            .execute()
            .await
    }

    /// DELETE `<api>/<resource>/<key>/`
    pub async fn delete(&self, key: &InstanceKey) -> Result<(), RestError> {
        let url = self.instance_url(key)?;
        self.fetch(url, Method::DELETE)?.execute_empty().await?;
        info!("Deleted {} under {}", key, self.base_url);
        Ok(())
    }

    /// POST to a custom action on one instance (`<key>/<action>/`)
    pub async fn action(
        &self,
        key: &InstanceKey,
        action: &str,
        body: Option<RequestBody>,
    ) -> Result<Value, RestError> {
        let mut url = self.instance_url(key)?;
        url.path_segments_mut()
            .map_err(|_| RestError::InvalidParameters(format!("Cannot extend {}", self.base_url)))?
            .pop_if_empty()
            .push(action)
            .push("");

        let fetch = self.fetch(url, Method::POST)?;
        let fetch = match body {
            Some(body) => fetch.body(body),
            None => fetch,
        };
        let response = fetch.send().await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            Ok(Value::Null)
        } else {
            serde_json::from_str(&text).map_err(|e| RestError::DeserializationError(e.to_string()))
        }
    }
}

#[async_trait]
impl ResourceApi for ResourceClient {
    fn key_field(&self) -> &KeyField {
        &self.key_field
    }

    async fn list(&self) -> Result<Vec<ResourceInstance>, RestError> {
        ResourceClient::list(self).await
    }

    async fn create(&self, body: RequestBody) -> Result<ResourceInstance, RestError> {
        ResourceClient::create(self, body).await
    }

    async fn update(
        &self,
        key: &InstanceKey,
        body: RequestBody,
    ) -> Result<ResourceInstance, RestError> {
        ResourceClient::update(self, key, body).await
    }

    async fn delete(&self, key: &InstanceKey) -> Result<(), RestError> {
        ResourceClient::delete(self, key).await
    }
}

/// `<api_root>/<resource>/` with exactly one slash between segments
fn resource_url(api_root: &str, resource: &str) -> Result<Url, RestError> {
    let mut url = Url::parse(api_root)?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| RestError::InvalidParameters(format!("Cannot be a base URL: {}", api_root)))?;
        segments.pop_if_empty();
        for segment in resource.split('/').filter(|segment| !segment.is_empty()) {
            segments.push(segment);
        }
        segments.push("");
    }
    Ok(url)
}
