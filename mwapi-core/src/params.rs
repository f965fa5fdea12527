// Request parameter values and their wire encoding
// Converts typed parameter values into the strings the Action API expects

use bytes::Bytes;
use indexmap::{IndexMap, IndexSet};

/// Separator used instead of `|` when a multi-value element itself contains a pipe.
pub const MULTI_VALUE_SEPARATOR: char = '\u{1f}';

/// A single parameter value before encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl Scalar {
    /// Encode this scalar, returning `None` if the parameter should be omitted.
    pub fn encode(&self) -> Option<String> {
        match self {
            Scalar::Bool(false) | Scalar::Null => None,
            Scalar::Bool(true) => Some(String::new()),
            Scalar::Integer(i) => Some(i.to_string()),
            Scalar::Float(f) => Some(f.to_string()),
            Scalar::String(s) => Some(s.clone()),
        }
    }
}

/// A file sent as part of a multipart POST request.
#[derive(Debug, Clone, PartialEq)]
pub struct FileParam {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl FileParam {
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            data: data.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// A request parameter value.
///
/// Lists are positional: two requests can only be combined if their lists
/// encode identically. Sets are unordered and get unioned when requests
/// are combined. Set elements are stored in their encoded form.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Scalar(Scalar),
    List(Vec<Scalar>),
    Set(IndexSet<String>),
    File(FileParam),
}

impl ParamValue {
    /// Build an ordered list value.
    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Scalar>,
    {
        ParamValue::List(items.into_iter().map(Into::into).collect())
    }

    /// Build an unordered set value. Omitted elements (`false`, `null`) are dropped.
    pub fn set<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Scalar>,
    {
        ParamValue::Set(
            items
                .into_iter()
                .filter_map(|item| item.into().encode())
                .collect(),
        )
    }

    pub fn is_set(&self) -> bool {
        matches!(self, ParamValue::Set(_))
    }

    pub fn is_file(&self) -> bool {
        matches!(self, ParamValue::File(_))
    }

    /// Encode to a wire string; `None` means "omit". Files have no text form.
    pub fn encode_text(&self) -> Option<String> {
        match self {
            ParamValue::Scalar(scalar) => scalar.encode(),
            ParamValue::List(items) => {
                Some(join_multi_value(items.iter().filter_map(Scalar::encode)))
            }
            ParamValue::Set(items) => Some(join_multi_value(items.iter().cloned())),
            ParamValue::File(_) => None,
        }
    }
}

fn join_multi_value(elements: impl Iterator<Item = String>) -> String {
    let elements: Vec<String> = elements.collect();
    if elements.iter().any(|element| element.contains('|')) {
        let mut joined = String::new();
        for element in &elements {
            joined.push(MULTI_VALUE_SEPARATOR);
            joined.push_str(element);
        }
        joined
    } else {
        elements.join("|")
    }
}

/// Request parameters keyed by name.
pub type Params = IndexMap<String, ParamValue>;

/// An encoded parameter ready for the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Text(String),
    File(FileParam),
}

impl WireValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            WireValue::Text(text) => Some(text),
            WireValue::File(_) => None,
        }
    }
}

/// Encoded request parameters.
pub type WireParams = IndexMap<String, WireValue>;

/// Encode one value, returning `None` if it should be omitted from the request.
pub fn encode_value(value: &ParamValue) -> Option<WireValue> {
    match value {
        ParamValue::File(file) => Some(WireValue::File(file.clone())),
        other => other.encode_text().map(WireValue::Text),
    }
}

/// Encode every parameter, dropping omitted ones.
pub fn encode_params(params: &Params) -> WireParams {
    params
        .iter()
        .filter_map(|(key, value)| encode_value(value).map(|wire| (key.clone(), wire)))
        .collect()
}

/// Whether any encoded parameter needs a multipart body.
pub fn has_files(params: &WireParams) -> bool {
    params.values().any(|value| matches!(value, WireValue::File(_)))
}

/// Build a [`Params`] map from `key => value` pairs.
///
/// ```
/// use mwapi_core::{params, ParamValue};
///
/// let params = params! {
///     "action" => "query",
///     "meta" => ParamValue::set(["siteinfo"]),
///     "formatversion" => 2,
/// };
/// assert_eq!(params.len(), 3);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        $crate::Params::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut params = $crate::Params::new();
        $(
            params.insert(
                ::std::string::String::from($key),
                $crate::ParamValue::from($value),
            );
        )+
        params
    }};
}

macro_rules! impl_scalar_from {
    ($($ty:ty => $variant:ident as $conv:ty),* $(,)?) => {
        $(
            impl From<$ty> for Scalar {
                fn from(value: $ty) -> Self {
                    Scalar::$variant(<$conv>::from(value))
                }
            }

            impl From<$ty> for ParamValue {
                fn from(value: $ty) -> Self {
                    ParamValue::Scalar(Scalar::from(value))
                }
            }
        )*
    };
}

impl_scalar_from! {
    String => String as String,
    &str => String as String,
    &String => String as String,
    bool => Bool as bool,
    i32 => Integer as i64,
    i64 => Integer as i64,
    u32 => Integer as i64,
    f64 => Float as f64,
}

impl From<u64> for Scalar {
    fn from(value: u64) -> Self {
        i64::try_from(value)
            .map(Scalar::Integer)
            .unwrap_or_else(|_| Scalar::String(value.to_string()))
    }
}

impl From<u64> for ParamValue {
    fn from(value: u64) -> Self {
        ParamValue::Scalar(value.into())
    }
}

impl From<usize> for Scalar {
    fn from(value: usize) -> Self {
        (value as u64).into()
    }
}

impl From<usize> for ParamValue {
    fn from(value: usize) -> Self {
        ParamValue::Scalar(value.into())
    }
}

impl From<Scalar> for ParamValue {
    fn from(value: Scalar) -> Self {
        ParamValue::Scalar(value)
    }
}

impl From<FileParam> for ParamValue {
    fn from(value: FileParam) -> Self {
        ParamValue::File(value)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ParamValue::Scalar(Scalar::Null), Into::into)
    }
}

impl<T: Into<Scalar>> From<Vec<T>> for ParamValue {
    fn from(items: Vec<T>) -> Self {
        ParamValue::list(items)
    }
}

impl<T: Into<Scalar>, const N: usize> From<[T; N]> for ParamValue {
    fn from(items: [T; N]) -> Self {
        ParamValue::list(items)
    }
}
