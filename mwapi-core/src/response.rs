// Response envelope interpretation
// Extracts errors, warnings and continuation data from decoded API bodies,
// accepting both the legacy (formatversion=1) and modern (formatversion=2) shapes

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Code of the warning emitted when a result exceeded the size limit.
pub const TRUNCATED_RESULT_CODE: &str = "truncatedresult";

const TRUNCATED_RESULT_PREFIX: &str = "This result was truncated because it would otherwise";
const TRUNCATED_RESULT_SUFFIX: &str = "be larger than the limit of";

/// One error or warning object from the response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiMessage(pub Map<String, Value>);

impl ApiMessage {
    pub fn new(fields: Map<String, Value>) -> Self {
        ApiMessage(fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn code(&self) -> Option<&str> {
        self.0.get("code").and_then(Value::as_str)
    }

    pub fn module(&self) -> Option<&str> {
        self.0.get("module").and_then(Value::as_str)
    }

    /// Human-readable text, whichever error format produced it.
    pub fn text(&self) -> Option<&str> {
        ["text", "info", "*", "warnings", "html"]
            .iter()
            .find_map(|key| self.0.get(*key).and_then(Value::as_str))
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_object().cloned().map(ApiMessage)
    }
}

/// Continuation tokens from the `continue` envelope key.
pub type ContinuationState = IndexMap<String, String>;

/// All error objects in the body, if it carries an error envelope.
pub fn extract_errors(body: &Value) -> Option<Vec<ApiMessage>> {
    if let Some(errors) = body.get("errors").and_then(Value::as_array) {
        let errors: Vec<ApiMessage> = errors.iter().filter_map(ApiMessage::from_value).collect();
        if !errors.is_empty() {
            return Some(errors);
        }
    }
    body.get("error")
        .and_then(ApiMessage::from_value)
        .map(|error| vec![error])
}

/// Warnings in a uniform list.
///
/// The legacy shape maps module names to one warning each; those are
/// flattened with a `module` field injected and `main` moved to the end.
/// The modern shape is already a list and is returned unchanged.
pub fn extract_warnings(body: &Value) -> Option<Vec<ApiMessage>> {
    match body.get("warnings")? {
        Value::Array(warnings) => Some(warnings.iter().filter_map(ApiMessage::from_value).collect()),
        Value::Object(modules) => {
            let mut warnings = Vec::with_capacity(modules.len());
            let mut main = None;
            for (module, warning) in modules {
                let Some(mut fields) = warning.as_object().cloned() else {
                    continue;
                };
                fields.insert("module".to_string(), Value::String(module.clone()));
                if module == "main" {
                    main = Some(ApiMessage(fields));
                } else {
                    warnings.push(ApiMessage(fields));
                }
            }
            warnings.extend(main);
            Some(warnings)
        }
        _ => None,
    }
}

/// Continuation tokens, if the server signalled that more data is available.
pub fn extract_continuation(body: &Value) -> Option<ContinuationState> {
    let object = body.get("continue")?.as_object()?;
    Some(
        object
            .iter()
            .filter_map(|(key, value)| {
                let token = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(true) => String::new(),
                    _ => return None,
                };
                Some((key.clone(), token))
            })
            .collect(),
    )
}

/// A response boolean under either formatversion.
///
/// formatversion=1 encodes true as `""` and false by omission;
/// formatversion=2 uses JSON booleans.
pub fn response_boolean(value: Option<&Value>) -> bool {
    !matches!(value, None | Some(Value::Null) | Some(Value::Bool(false)))
}

pub fn is_batch_complete(body: &Value) -> bool {
    response_boolean(body.get("batchcomplete"))
}

fn is_truncation_warning(warning: &ApiMessage) -> bool {
    match warning.code() {
        Some(code) => code == TRUNCATED_RESULT_CODE,
        None => warning.text().is_some_and(|text| {
            text.trim_start().starts_with(TRUNCATED_RESULT_PREFIX)
                && text.contains(TRUNCATED_RESULT_SUFFIX)
        }),
    }
}

/// Remove "result truncated" warnings.
pub fn drop_truncation_warning(warnings: Vec<ApiMessage>) -> Vec<ApiMessage> {
    warnings
        .into_iter()
        .filter(|warning| !is_truncation_warning(warning))
        .collect()
}
