use reqwest::multipart;

use crate::form::Attachment;
use crate::form::AttachmentSlot;
use crate::form::FormError;
use crate::form::FormState;
use crate::form::PayloadType;
use crate::test_type::TestType;

// File parts go last, in this order.
const FILE_ORDER: [AttachmentSlot; 3] = [
    AttachmentSlot::EnvVars,
    AttachmentSlot::DataFile,
    AttachmentSlot::PayloadTemplate,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartValue {
    Text(String),
    File(Attachment),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub name: &'static str,
    pub value: PartValue,
}

/// An encoded start request: the ordered multipart body and where it goes.
#[derive(Debug, Clone)]
pub struct Submission {
    pub test_type: TestType,
    pub parts: Vec<Part>,
}

/// Validates the form and encodes it as a start submission.
///
/// Parts are emitted in a fixed order: the `load_type` token, the non-empty
/// request fields, `payloadType`, the inline payload (body methods only),
/// the non-blank load parameters and finally the selected files.
pub fn encode(form: &FormState) -> Result<Submission, FormError> {
    form.validate()?;

    let mut parts = vec![text("load_type", form.test_type().load_type_token())];

    for (name, value) in form.request.fields() {
        if !value.is_empty() {
            parts.push(text(name, value));
        }
    }

    parts.push(text(
        "payloadType",
        form.payload.kind.map(PayloadType::as_str).unwrap_or_default(),
    ));

    if !form.payload.inline.is_empty() && form.request.carries_payload() {
        parts.push(text("inlinePayloadContent", &form.payload.inline));
    }

    for (spec, value) in form.load().non_empty_entries() {
        parts.push(text(spec.name, value));
    }

    for slot in FILE_ORDER {
        if let Some(attachment) = form.files().get(slot) {
            parts.push(Part {
                name: slot.field_name(),
                value: PartValue::File(attachment.clone()),
            });
        }
    }

    Ok(Submission {
        test_type: form.test_type(),
        parts,
    })
}

fn text(name: &'static str, value: impl Into<String>) -> Part {
    Part {
        name,
        value: PartValue::Text(value.into()),
    }
}

impl Submission {
    pub fn path(&self) -> String {
        format!("/perf-service/api/{}/start", self.test_type.path_segment())
    }

    pub fn into_multipart(self) -> multipart::Form {
        self.parts
            .into_iter()
            .fold(multipart::Form::new(), |form, part| match part.value {
                PartValue::Text(value) => form.text(part.name, value),
                PartValue::File(attachment) => form.part(
                    part.name,
                    multipart::Part::bytes(attachment.bytes).file_name(attachment.file_name),
                ),
            })
    }
}
