//! Form instance controller
//!
//! One [`FormController`] drives the create/edit form of an admin card:
//!
//! ```text
//! Idle --open_create/open_edit--> Editing --begin_submit--> Submitting
//!   ^                                ^                           |
//!   +----------- success ------------+------- failure -----------+
//! ```
//!
//! Submitting is split in two so the caller can keep handling input while
//! the request runs: [`FormController::begin_submit`] hands out an owned
//! [`PreparedSubmit`], and [`FormController::finish_submit`] records its
//! outcome. [`FormController::submit`] does both. A session opened while a
//! submit was in flight is left alone when that submit finishes.

use clubs_rust_rest::{
    InstanceKey, RequestBody, ResourceApi, ResourceClient, ResourceInstance, UploadPart,
};
use clubs_rust_schema::{FieldErrors, FieldSchema, FieldValue, FormValues, InputSpec, WirePayload};
use log::{debug, info, warn};
use serde_json::Value;
use std::sync::Arc;

use crate::collection::CollectionSync;
use crate::error::Error;

/// Where the form is in its life cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormPhase {
    Idle,
    Editing,
    Submitting,
}

/// State of one open form
#[derive(Debug, Clone)]
pub struct FormSession {
    id: u64,
    target: Option<ResourceInstance>,
    target_key: Option<InstanceKey>,
    values: FormValues,
    initial: FormValues,
    submitting: bool,
    errors: FieldErrors,
    notice: Option<String>,
}

impl FormSession {
    fn new(id: u64, target: Option<(InstanceKey, ResourceInstance)>, values: FormValues) -> Self {
        let (target_key, target) = match target {
            Some((key, instance)) => (Some(key), Some(instance)),
            None => (None, None),
        };
        Self {
            id,
            target,
            target_key,
            initial: values.clone(),
            values,
            submitting: false,
            errors: FieldErrors::new(),
            notice: None,
        }
    }

    /// Distinguishes this session from earlier ones of the same controller
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Instance being edited; `None` for a create form
    pub fn target(&self) -> Option<&ResourceInstance> {
        self.target.as_ref()
    }

    pub fn target_key(&self) -> Option<&InstanceKey> {
        self.target_key.as_ref()
    }

    pub fn is_create(&self) -> bool {
        self.target.is_none()
    }

    pub fn values(&self) -> &FormValues {
        &self.values
    }

    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    pub fn initial(&self) -> &FormValues {
        &self.initial
    }

    /// Whether any value differs from what the form was opened with
    pub fn is_dirty(&self) -> bool {
        self.values != self.initial
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    /// Client-side and server field errors, by field name
    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    /// Form-level message from the last failed submit
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }
}

/// A submit that has passed the guards, ready to be sent
#[derive(Debug, Clone)]
pub struct PreparedSubmit {
    session_id: u64,
    target_key: Option<InstanceKey>,
    body: RequestBody,
}

impl PreparedSubmit {
    /// Session the submit was prepared from
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn target_key(&self) -> Option<&InstanceKey> {
        self.target_key.as_ref()
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    /// POST for a create form, PATCH/PUT for an edit form
    pub async fn send<A: ResourceApi>(self, sync: &CollectionSync<A>) -> SubmitOutcome {
        let result = match self.target_key {
            Some(key) => sync.update(&key, self.body).await,
            None => sync.create(self.body).await,
        };
        SubmitOutcome {
            session_id: self.session_id,
            result,
        }
    }
}

/// Result of a sent [`PreparedSubmit`], tagged with its session
#[derive(Debug)]
pub struct SubmitOutcome {
    session_id: u64,
    result: Result<ResourceInstance, Error>,
}

impl SubmitOutcome {
    pub fn new(session_id: u64, result: Result<ResourceInstance, Error>) -> Self {
        Self { session_id, result }
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn result(&self) -> &Result<ResourceInstance, Error> {
        &self.result
    }

    pub fn into_result(self) -> Result<ResourceInstance, Error> {
        self.result
    }
}

/// Controller for the create/edit form of one resource
pub struct FormController<A: ResourceApi = ResourceClient> {
    schema: Arc<FieldSchema>,
    sync: CollectionSync<A>,
    session: Option<FormSession>,
    next_session: u64,
}

impl<A: ResourceApi> FormController<A> {
    pub fn new(schema: Arc<FieldSchema>, sync: CollectionSync<A>) -> Self {
        Self {
            schema,
            sync,
            session: None,
            next_session: 0,
        }
    }

    fn open(&mut self, target: Option<(InstanceKey, ResourceInstance)>, values: FormValues) {
        self.next_session += 1;
        self.session = Some(FormSession::new(self.next_session, target, values));
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    pub fn sync(&self) -> &CollectionSync<A> {
        &self.sync
    }

    pub fn session(&self) -> Option<&FormSession> {
        self.session.as_ref()
    }

    pub fn phase(&self) -> FormPhase {
        match &self.session {
            None => FormPhase::Idle,
            Some(session) if session.submitting => FormPhase::Submitting,
            Some(_) => FormPhase::Editing,
        }
    }

    pub fn input_specs(&self) -> Vec<InputSpec> {
        self.schema.input_specs()
    }

    /// Open a blank form. Replaces any open session.
    pub fn open_create(&mut self) {
        debug!("Opening create form");
        let values = self.schema.empty_values();
        self.open(None, values);
    }

    /// Open a form for an existing instance. Replaces any open session.
    pub fn open_edit(&mut self, instance: &ResourceInstance) -> Result<(), Error> {
        let key_field = self.sync.key_field();
        let key = instance
            .key(key_field)
            .ok_or_else(|| Error::missing_key(key_field))?;
        debug!("Opening edit form for {}", key);

        let values = self.schema.read_instance(instance.fields());
        self.open(Some((key, instance.clone())), values);
        Ok(())
    }

    /// Change one value. Clears that field's error.
    pub fn set_value(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<(), Error> {
        if self.schema.get(name).is_none() {
            return Err(Error::UnknownField(name.to_string()));
        }
        let session = self.session.as_mut().ok_or(Error::NoSession)?;
        session.values.insert(name.to_string(), value.into());
        session.errors.remove(name);
        Ok(())
    }

    /// Whether the submit button should be enabled
    pub fn can_submit(&self) -> bool {
        match &self.session {
            Some(session) => {
                !session.submitting
                    && session.is_dirty()
                    && self.schema.validate(&session.values).is_empty()
            }
            None => false,
        }
    }

    /// Run the guards and build the request. Refused submits leave the
    /// network alone; validation failures are recorded in the session.
    pub fn begin_submit(&mut self) -> Result<PreparedSubmit, Error> {
        let session = self.session.as_mut().ok_or(Error::NoSession)?;
        if session.submitting {
            return Err(Error::AlreadySubmitting);
        }
        if !session.is_dirty() {
            debug!("Submit refused: nothing changed");
            return Err(Error::NotDirty);
        }

        let errors = self.schema.validate(&session.values);
        if !errors.is_empty() {
            debug!("Submit refused: {} invalid fields", errors.len());
            session.errors = errors.clone();
            return Err(Error::Validation(errors));
        }

        let body = request_body(self.schema.build_payload(&session.values));
        session.submitting = true;
        session.errors.clear();
        session.notice = None;

        Ok(PreparedSubmit {
            session_id: session.id,
            target_key: session.target_key.clone(),
            body,
        })
    }

    /// Record the outcome of a [`PreparedSubmit`]. Success closes the form;
    /// failure keeps it open with the errors attached. An outcome whose
    /// session has since been replaced or closed only hands back its result.
    pub fn finish_submit(&mut self, outcome: SubmitOutcome) -> Result<ResourceInstance, Error> {
        let SubmitOutcome { session_id, result } = outcome;
        let Some(session) = self.session.as_mut().filter(|session| session.id == session_id) else {
            debug!("Submit of session {} finished after the form moved on", session_id);
            return result;
        };

        match result {
            Ok(instance) => {
                info!("Saved {:?}", instance.key(self.sync.key_field()));
                self.session = None;
                Ok(instance)
            }
            Err(error) => {
                session.submitting = false;
                record_failure(&self.schema, session, &error);
                Err(error)
            }
        }
    }

    pub async fn submit(&mut self) -> Result<ResourceInstance, Error> {
        let prepared = self.begin_submit()?;
        let outcome = prepared.send(&self.sync).await;
        self.finish_submit(outcome)
    }

    /// Discard the open session
    pub fn cancel(&mut self) {
        if self.session.take().is_some() {
            debug!("Form cancelled");
        }
    }

    /// Delete `instance`; closes the form when it was editing that instance
    pub async fn delete(&mut self, instance: &ResourceInstance) -> Result<(), Error> {
        let key_field = self.sync.key_field();
        let key = instance
            .key(key_field)
            .ok_or_else(|| Error::missing_key(key_field))?;

        self.sync.delete(&key).await?;
        if self
            .session
            .as_ref()
            .and_then(FormSession::target_key)
            .is_some_and(|target| target == &key)
        {
            self.session = None;
        }
        Ok(())
    }
}

/// Server field errors go next to their fields; anything else becomes the
/// notice.
fn record_failure(schema: &FieldSchema, session: &mut FormSession, error: &Error) {
    match error.rejection() {
        Some(body) => {
            let server_errors = body
                .fields()
                .filter(|(field, _)| schema.get(field).is_some())
                .map(|(field, messages)| (field.to_string(), messages.join(" ")))
                .collect::<FieldErrors>();
            session.errors.extend(server_errors);
            session.notice = Some(body.format());
        }
        None => {
            warn!("Submit failed: {}", error);
            session.notice = Some(error.to_string());
        }
    }
}

fn request_body(payload: WirePayload) -> RequestBody {
    if !payload.is_multipart() {
        return RequestBody::Json(Value::Object(payload.fields));
    }
    let files = payload
        .files
        .into_iter()
        .map(|(field, upload)| UploadPart {
            field,
            file_name: upload.file_name,
            content_type: upload.content_type,
            bytes: upload.bytes,
        })
        .collect();
    RequestBody::Multipart {
        fields: payload.fields,
        files,
    }
}
