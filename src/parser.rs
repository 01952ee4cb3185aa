use serde::Deserialize;

/// A run file: the form contents of one test run, written as TOML.
///
/// ```toml
/// test_type = "Ramp-Up Test"
///
/// [request]
/// method = "POST"
/// url = "/api/orders"
/// host = "https://shop.example"
/// headers = { Accept = "application/json" }
///
/// [payload]
/// type = "json"
/// inline = '{"sku": "abc"}'
///
/// [load]
/// users = 100
/// spawnRate = 10
/// duration = "300"
///
/// [files]
/// env_vars = "env.json"
/// ```
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct RunFile {
    pub test_type: String,
    pub request: Request,
    #[serde(default)]
    pub payload: Payload,
    #[serde(default)]
    pub load: toml::Table,
    #[serde(default)]
    pub files: Files,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub method: String,
    pub url: String,
    pub host: String,
    pub auth_token: Option<String>,
    pub headers: Option<TextOrTable>,
    pub query_params: Option<TextOrTable>,
}

/// Free text, or a table that is sent as its JSON rendering.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum TextOrTable {
    Text(String),
    Table(toml::Table),
}

impl TextOrTable {
    pub fn into_text(self) -> String {
        match self {
            TextOrTable::Text(text) => text,
            TextOrTable::Table(table) => {
                let json = table
                    .into_iter()
                    .map(|(key, value)| (key, toml_to_json(value)))
                    .collect::<serde_json::Map<_, _>>();
                serde_json::Value::Object(json).to_string()
            }
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct Payload {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub inline: Option<String>,
}

/// Attachment paths, relative to the run file.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct Files {
    pub data: Option<String>,
    pub payload_template: Option<String>,
    pub env_vars: Option<String>,
}

/// Load values are entered as text; TOML numbers and booleans are accepted
/// and kept in their literal form.
pub fn load_value_text(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(text) => Some(text.clone()),
        toml::Value::Integer(num) => Some(num.to_string()),
        toml::Value::Float(num) => Some(num.to_string()),
        toml::Value::Boolean(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(text) => text.into(),
        toml::Value::Integer(num) => num.into(),
        toml::Value::Float(num) => num.into(),
        toml::Value::Boolean(flag) => flag.into(),
        toml::Value::Datetime(datetime) => datetime.to_string().into(),
        toml::Value::Array(items) => items.into_iter().map(toml_to_json).collect(),
        toml::Value::Table(table) => table
            .into_iter()
            .map(|(key, value)| (key, toml_to_json(value)))
            .collect::<serde_json::Map<_, _>>()
            .into(),
    }
}
