use std::fmt;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::test_type::FieldKind;
use crate::test_type::LoadParams;
use crate::test_type::TestType;
use crate::test_type::UndeclaredField;

pub const REQUIRED_FIELDS_MESSAGE: &str =
    "Method, URL, Host, and Payload Type are required fields.";

#[derive(Debug, Error)]
pub enum FormError {
    #[error("{}", REQUIRED_FIELDS_MESSAGE)]
    MissingRequired,

    #[error("`{field}` must be a number, got `{value}`")]
    NotNumeric { field: &'static str, value: String },

    #[error("the {0} upload is not offered for this method, payload type and test type")]
    FileNotOffered(AttachmentSlot),

    #[error(transparent)]
    UndeclaredField(#[from] UndeclaredField),

    #[error("unknown HTTP method `{0}` (expected GET, POST, PUT, PATCH or DELETE)")]
    UnknownMethod(String),

    #[error("unknown payload type `{0}` (expected json, form, text, binary or protobuf)")]
    UnknownPayloadType(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 5] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// POST, PUT and PATCH are the methods that send a request body.
    pub fn carries_payload(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl FromStr for HttpMethod {
    type Err = FormError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HttpMethod::ALL
            .into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| FormError::UnknownMethod(s.to_string()))
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadType {
    Json,
    Form,
    Text,
    Binary,
    Protobuf,
}

impl PayloadType {
    pub const ALL: [PayloadType; 5] = [
        PayloadType::Json,
        PayloadType::Form,
        PayloadType::Text,
        PayloadType::Binary,
        PayloadType::Protobuf,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PayloadType::Json => "json",
            PayloadType::Form => "form",
            PayloadType::Text => "text",
            PayloadType::Binary => "binary",
            PayloadType::Protobuf => "protobuf",
        }
    }

    /// Protobuf values come from the data file, every other type may use a
    /// payload template.
    pub fn accepts_template(self) -> bool {
        !matches!(self, PayloadType::Protobuf)
    }
}

impl FromStr for PayloadType {
    type Err = FormError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PayloadType::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| FormError::UnknownPayloadType(s.to_string()))
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    pub method: Option<HttpMethod>,
    pub url: String,
    pub host: String,
    pub auth_token: String,
    /// JSON object as text, forwarded untouched.
    pub headers: String,
    /// JSON object as text, forwarded untouched.
    pub query_params: String,
}

impl Default for RequestSpec {
    fn default() -> Self {
        Self {
            method: Some(HttpMethod::Get),
            url: String::new(),
            host: String::new(),
            auth_token: String::new(),
            headers: String::new(),
            query_params: String::new(),
        }
    }
}

impl RequestSpec {
    /// Wire name and value of every request field, in form order.
    pub fn fields(&self) -> [(&'static str, &str); 6] {
        [
            ("method", self.method.map(HttpMethod::as_str).unwrap_or_default()),
            ("url", &self.url),
            ("host", &self.host),
            ("auth_token", &self.auth_token),
            ("headers", &self.headers),
            ("query_params", &self.query_params),
        ]
    }

    pub fn carries_payload(&self) -> bool {
        self.method.is_some_and(HttpMethod::carries_payload)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub kind: Option<PayloadType>,
    pub inline: String,
}

impl Default for Payload {
    fn default() -> Self {
        Self {
            kind: Some(PayloadType::Json),
            inline: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentSlot {
    DataFile,
    PayloadTemplate,
    EnvVars,
}

impl AttachmentSlot {
    pub fn field_name(self) -> &'static str {
        match self {
            AttachmentSlot::DataFile => "dataFile",
            AttachmentSlot::PayloadTemplate => "payloadTemplateFile",
            AttachmentSlot::EnvVars => "envVarsFile",
        }
    }
}

impl fmt::Display for AttachmentSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentSlot::DataFile => f.write_str("data file"),
            AttachmentSlot::PayloadTemplate => f.write_str("payload template file"),
            AttachmentSlot::EnvVars => f.write_str("environment variables file"),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    pub async fn read(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self { file_name, bytes })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attachments {
    pub data_file: Option<Attachment>,
    pub payload_template: Option<Attachment>,
    pub env_vars: Option<Attachment>,
}

impl Attachments {
    pub fn get(&self, slot: AttachmentSlot) -> Option<&Attachment> {
        match slot {
            AttachmentSlot::DataFile => self.data_file.as_ref(),
            AttachmentSlot::PayloadTemplate => self.payload_template.as_ref(),
            AttachmentSlot::EnvVars => self.env_vars.as_ref(),
        }
    }

    fn slot_mut(&mut self, slot: AttachmentSlot) -> &mut Option<Attachment> {
        match slot {
            AttachmentSlot::DataFile => &mut self.data_file,
            AttachmentSlot::PayloadTemplate => &mut self.payload_template,
            AttachmentSlot::EnvVars => &mut self.env_vars,
        }
    }
}

/// Which optional controls the form currently offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldVisibility {
    pub payload_type: bool,
    pub inline_payload: bool,
    pub data_file: bool,
    pub payload_template_file: bool,
    pub env_vars_file: bool,
}

impl FieldVisibility {
    pub fn offers(&self, slot: AttachmentSlot) -> bool {
        match slot {
            AttachmentSlot::DataFile => self.data_file,
            AttachmentSlot::PayloadTemplate => self.payload_template_file,
            AttachmentSlot::EnvVars => self.env_vars_file,
        }
    }
}

/// State behind the test configuration form.
#[derive(Debug, Clone)]
pub struct FormState {
    test_type: TestType,
    pub request: RequestSpec,
    pub payload: Payload,
    load: LoadParams,
    files: Attachments,
    response_summary: Option<String>,
}

impl FormState {
    pub fn new(test_type: TestType) -> Self {
        Self {
            test_type,
            request: RequestSpec::default(),
            payload: Payload::default(),
            load: LoadParams::empty(test_type),
            files: Attachments::default(),
            response_summary: None,
        }
    }

    pub fn test_type(&self) -> TestType {
        self.test_type
    }

    pub fn load(&self) -> &LoadParams {
        &self.load
    }

    pub fn files(&self) -> &Attachments {
        &self.files
    }

    pub fn response_summary(&self) -> Option<&str> {
        self.response_summary.as_deref()
    }

    pub fn set_response_summary(&mut self, summary: impl Into<String>) {
        self.response_summary = Some(summary.into());
    }

    /// Switches the active test type. Load values, every file selection and
    /// the last response summary are discarded, even when the type does not
    /// change.
    pub fn select_test_type(&mut self, test_type: TestType) {
        tracing::debug!(from = %self.test_type, to = %test_type, "switching test type");

        self.test_type = test_type;
        self.load = LoadParams::empty(test_type);
        self.files = Attachments::default();
        self.response_summary = None;
    }

    pub fn set_load(&mut self, name: &str, value: impl Into<String>) -> Result<(), FormError> {
        self.load.set(name, value).map_err(FormError::UndeclaredField)
    }

    pub fn visibility(&self) -> FieldVisibility {
        let payload_related = self.request.carries_payload();
        let protobuf_from_file =
            self.payload.kind == Some(PayloadType::Protobuf) && self.files.data_file.is_some();

        FieldVisibility {
            payload_type: payload_related,
            inline_payload: payload_related && !protobuf_from_file,
            data_file: payload_related || self.test_type == TestType::DataDriven,
            payload_template_file: payload_related
                && self.payload.kind.is_some_and(PayloadType::accepts_template),
            env_vars_file: true,
        }
    }

    /// Selects a file for `slot`. Only uploads the form currently offers can
    /// receive a file.
    pub fn choose_file(
        &mut self,
        slot: AttachmentSlot,
        attachment: Attachment,
    ) -> Result<(), FormError> {
        if !self.visibility().offers(slot) {
            return Err(FormError::FileNotOffered(slot));
        }

        tracing::debug!(%slot, file_name = %attachment.file_name, "file selected");
        *self.files.slot_mut(slot) = Some(attachment);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), FormError> {
        if self.request.method.is_none()
            || self.request.url.is_empty()
            || self.request.host.is_empty()
            || self.payload.kind.is_none()
        {
            return Err(FormError::MissingRequired);
        }

        for (spec, value) in self.load.non_empty_entries() {
            if spec.kind == FieldKind::Numeric && value.trim().parse::<f64>().is_err() {
                return Err(FormError::NotNumeric {
                    field: spec.name,
                    value: value.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Every form value, empty ones included, for the run history.
    pub fn snapshot(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut params = serde_json::Map::new();

        for (name, value) in self.request.fields() {
            params.insert(name.into(), value.into());
        }
        for (spec, value) in self.load.entries() {
            params.insert(spec.name.into(), value.into());
        }
        params.insert(
            "payloadType".into(),
            self.payload.kind.map(PayloadType::as_str).unwrap_or_default().into(),
        );
        params.insert("inlinePayload".into(), self.payload.inline.clone().into());

        params
    }
}
