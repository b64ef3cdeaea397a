//! HTTP request builder shared by every resource call

use bytes::Bytes;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use url::Url;

use crate::error::{ApiErrorBody, RestError};

/// A file sent as one part of a multipart body
#[derive(Debug, Clone, PartialEq)]
pub struct UploadPart {
    pub field: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Body of a create or update request
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    /// `multipart/form-data`, used only when a file is uploaded
    Multipart {
        fields: Map<String, Value>,
        files: Vec<UploadPart>,
    },
}

impl RequestBody {
    pub fn json<T: Serialize>(body: &T) -> Result<Self, RestError> {
        Ok(RequestBody::Json(serde_json::to_value(body)?))
    }

    /// Multipart has no encoding for an empty list. A multipart body holding
    /// one is split into its fields as JSON and the files to send afterwards.
    pub fn split_empty_lists(self) -> (RequestBody, Option<Vec<UploadPart>>) {
        match self {
            RequestBody::Multipart { fields, files }
                if fields
                    .values()
                    .any(|value| matches!(value, Value::Array(items) if items.is_empty())) =>
            {
                (RequestBody::Json(Value::Object(fields)), Some(files))
            }
            other => (other, None),
        }
    }

    /// JSON-visible fields of the body
    pub fn fields(&self) -> Option<&Map<String, Value>> {
        match self {
            RequestBody::Json(Value::Object(fields)) => Some(fields),
            RequestBody::Json(_) => None,
            RequestBody::Multipart { fields, .. } => Some(fields),
        }
    }
}

/// Helper for building and executing one request
pub(crate) struct FetchBuilder<'a> {
    client: &'a Client,
    url: Url,
    method: Method,
    headers: HeaderMap,
    body: Option<RequestBody>,
}

impl<'a> FetchBuilder<'a> {
    /// Every call asks for JSON with `?format=json`; URLs handed back by the
    /// server (`next` links) may carry it already
    pub fn new(client: &'a Client, mut url: Url, method: Method) -> Self {
        if !url.query_pairs().any(|(key, _)| key == "format") {
            url.query_pairs_mut().append_pair("format", "json");
        }
        let mut headers = HeaderMap::new();
        headers.insert("Accept", HeaderValue::from_static("application/json"));

        Self {
            client,
            url,
            method,
            headers,
            body: None,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn headers(mut self, headers: &HeaderMap) -> Self {
        for (name, value) in headers {
            self.headers.insert(name.clone(), value.clone());
        }
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Result<Self, RestError> {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| RestError::InvalidParameters(format!("Invalid header name: {}", name)))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| RestError::InvalidParameters(format!("Invalid header value: {}", value)))?;
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    pub fn query(mut self, params: &[(String, String)]) -> Self {
        if !params.is_empty() {
            let mut pairs = self.url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    fn build(self) -> Result<RequestBuilder, RestError> {
        let request = self
            .client
            .request(self.method, self.url)
            .headers(self.headers);

        let request = match self.body {
            None => request,
            Some(RequestBody::Json(body)) => request.json(&body),
            Some(RequestBody::Multipart { fields, files }) => {
                request.multipart(multipart_form(fields, files)?)
            }
        };

        Ok(request)
    }

    /// Send the request, turning non-2xx statuses into errors
    pub async fn send(self) -> Result<Response, RestError> {
        debug!("{} {}", self.method, self.url);
        let request = self.build()?;
        let response = request.send().await?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_for_response(response).await)
        }
    }

    /// Send and parse the JSON body
    pub async fn execute<T: DeserializeOwned>(self) -> Result<T, RestError> {
        let response = self.send().await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Err(RestError::DeserializationError(
                "empty response body".to_string(),
            ));
        }
        serde_json::from_str::<T>(&text).map_err(|e| RestError::DeserializationError(e.to_string()))
    }

    /// Send and ignore the body (DELETE answers 204)
    pub async fn execute_empty(self) -> Result<(), RestError> {
        self.send().await?;
        Ok(())
    }
}

fn multipart_form(fields: Map<String, Value>, files: Vec<UploadPart>) -> Result<Form, RestError> {
    let mut form = Form::new();
    for (name, value) in fields {
        match value {
            // Lists go out as repeated keys
            Value::Array(items) => {
                for item in items {
                    form = form.text(name.clone(), text_part(item));
                }
            }
            other => form = form.text(name, text_part(other)),
        }
    }

    for file in files {
        let mut part = Part::bytes(file.bytes.to_vec()).file_name(file.file_name);
        if let Some(content_type) = &file.content_type {
            part = part.mime_str(content_type)?;
        }
        form = form.part(file.field, part);
    }

    Ok(form)
}

fn text_part(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text,
        other => other.to_string(),
    }
}

/// Map a non-2xx response to the matching error
pub(crate) async fn error_for_response(response: Response) -> RestError {
    let status = response.status();
    let url = response.url().to_string();
    warn!("Request to {} failed with status {}", url, status);

    if status == StatusCode::NOT_FOUND {
        return RestError::NotFound { url };
    }

    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error response".to_string());

    match serde_json::from_str::<Value>(&text) {
        Ok(body) => {
            let errors = ApiErrorBody::from_value(&body);
            if errors.is_empty() {
                RestError::UnparsedApiError {
                    message: text,
                    status,
                }
            } else {
                RestError::Rejected { status, errors }
            }
        }
        Err(_) => RestError::UnparsedApiError {
            message: text,
            status,
        },
    }
}
