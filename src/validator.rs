use std::path::Path;
use std::path::PathBuf;

use miette::Diagnostic;
use miette::NamedSource;
use miette::SourceSpan;
use thiserror::Error;

use crate::form::AttachmentSlot;
use crate::form::FormState;
use crate::form::HttpMethod;
use crate::form::PayloadType;
use crate::parser::RunFile;
use crate::parser::load_value_text;
use crate::test_type::TestType;

/// A run file turned into form state, plus the attachments it asks for.
#[derive(Debug)]
pub struct ValidatedRun {
    pub form: FormState,
    /// Resolved against the run file's directory.
    pub files: Vec<(AttachmentSlot, PathBuf)>,
}

#[derive(Debug, Error, Diagnostic)]
#[error("Invalid field `{field}`: {message}")]
pub struct ValidationError {
    field: String,
    message: String,
    #[source_code]
    src: Option<NamedSource<String>>,
    #[label("invalid value here")]
    span: Option<SourceSpan>,
}

macro_rules! validation_err {
    ($field:expr, $msg:expr, $self:expr, $snippet:expr) => {
        ValidationError {
            field: $field.to_string(),
            message: $msg.to_string(),
            src: Some(NamedSource::new(
                $self.file_name.clone(),
                $self.toml_src.clone(),
            )),
            span: find_span($snippet, &$self.toml_src),
        }
    };
}

pub struct Validator {
    run: RunFile,
    toml_src: String,
    file_name: String,
}

impl Validator {
    pub fn new(run: &RunFile, toml_src: &str, file_name: &str) -> Self {
        Self {
            run: run.clone(),
            toml_src: toml_src.into(),
            file_name: file_name.into(),
        }
    }

    /// Builds the form the run file describes. `test_type` replaces the
    /// file's own `test_type` when given, which then does not need to name a
    /// known type.
    pub fn validate(&self, test_type: Option<TestType>) -> Result<ValidatedRun, ValidationError> {
        let mut form = match test_type {
            Some(test_type) => {
                let mut form = FormState::new(self.run.test_type.parse().unwrap_or(test_type));
                form.select_test_type(test_type);
                form
            }
            None => FormState::new(self.validate_test_type()?),
        };

        self.fill_request(&mut form)?;
        self.fill_payload(&mut form)?;
        self.fill_load(&mut form)?;
        let files = self.validate_files(&form)?;

        Ok(ValidatedRun { form, files })
    }

    fn validate_test_type(&self) -> Result<TestType, ValidationError> {
        let raw = &self.run.test_type;
        raw.parse::<TestType>().map_err(|_| {
            let known = TestType::ALL.map(TestType::label).join(", ");
            validation_err!(
                "test_type",
                format!("Unknown test type `{raw}`, expected one of: {known}"),
                self,
                raw
            )
        })
    }

    fn fill_request(&self, form: &mut FormState) -> Result<(), ValidationError> {
        let request = &self.run.request;

        let method = request
            .method
            .parse::<HttpMethod>()
            .map_err(|e| validation_err!("request.method", e, self, &request.method))?;

        form.request.method = Some(method);
        form.request.url = request.url.trim().to_string();
        form.request.host = request.host.trim().to_string();
        form.request.auth_token = request.auth_token.clone().unwrap_or_default();
        form.request.headers = request
            .headers
            .clone()
            .map(|headers| headers.into_text())
            .unwrap_or_default();
        form.request.query_params = request
            .query_params
            .clone()
            .map(|params| params.into_text())
            .unwrap_or_default();

        if form.request.url.is_empty() {
            return Err(validation_err!("request.url", "URL can't be empty", self, "url"));
        }
        if form.request.host.is_empty() {
            return Err(validation_err!("request.host", "Host can't be empty", self, "host"));
        }

        Ok(())
    }

    fn fill_payload(&self, form: &mut FormState) -> Result<(), ValidationError> {
        let payload = &self.run.payload;

        if let Some(kind) = &payload.kind {
            let kind = kind
                .parse::<PayloadType>()
                .map_err(|e| validation_err!("payload.type", e, self, kind))?;
            form.payload.kind = Some(kind);
        }

        if let Some(inline) = &payload.inline {
            if !form.request.carries_payload() {
                tracing::warn!(
                    method = ?form.request.method,
                    "inline payload is ignored for methods without a body"
                );
            }
            form.payload.inline = inline.clone();
        }

        Ok(())
    }

    fn fill_load(&self, form: &mut FormState) -> Result<(), ValidationError> {
        let test_type = form.test_type();

        for (key, value) in &self.run.load {
            let text = load_value_text(value).ok_or_else(|| {
                validation_err!(
                    format!("load.{key}"),
                    "Load values must be numbers or strings",
                    self,
                    key
                )
            })?;

            form.set_load(key, text).map_err(|_| {
                let declared = test_type
                    .fields()
                    .iter()
                    .map(|spec| spec.name)
                    .collect::<Vec<_>>()
                    .join(", ");
                validation_err!(
                    format!("load.{key}"),
                    format!("{test_type} has no `{key}` parameter, expected one of: {declared}"),
                    self,
                    key
                )
            })?;
        }

        Ok(())
    }

    fn validate_files(
        &self,
        form: &FormState,
    ) -> Result<Vec<(AttachmentSlot, PathBuf)>, ValidationError> {
        let base_dir = Path::new(&self.file_name)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let visibility = form.visibility();
        let files = &self.run.files;

        let requested = [
            (AttachmentSlot::EnvVars, "files.env_vars", &files.env_vars),
            (AttachmentSlot::DataFile, "files.data", &files.data),
            (
                AttachmentSlot::PayloadTemplate,
                "files.payload_template",
                &files.payload_template,
            ),
        ];

        requested
            .into_iter()
            .filter_map(|(slot, field, path)| path.as_ref().map(|path| (slot, field, path)))
            .map(|(slot, field, path)| {
                if !visibility.offers(slot) {
                    return Err(validation_err!(
                        field,
                        format!(
                            "The {slot} upload is not offered for {} with method {} and payload type {}",
                            form.test_type(),
                            form.request.method.map(HttpMethod::as_str).unwrap_or("none"),
                            form.payload.kind.map(PayloadType::as_str).unwrap_or("none"),
                        ),
                        self,
                        path
                    ));
                }
                Ok((slot, base_dir.join(path)))
            })
            .collect()
    }
}

/// Span of `needle` in the source, preferring a quoted occurrence.
fn find_span(needle: &str, toml_src: &str) -> Option<SourceSpan> {
    let pattern = format!("\"{needle}\"");
    toml_src
        .find(&pattern)
        .map(|start| start + 1)
        .or_else(|| toml_src.find(needle))
        .map(|start| SourceSpan::new(start.into(), needle.len()))
}
