// Request combining rules
// Decides whether two pending requests can be answered by one API call,
// and computes the merged parameters and options if so

use crate::options::{Options, RequestOptions, WarnHandler};
use crate::params::{ParamValue, Params};
use indexmap::IndexSet;
use std::sync::Arc;

/// Parameters selecting a page set from a generator or a continuation.
const GENERATOR_PARAMS: &[&str] = &["generator", "continue"];

/// Parameters naming an explicit set of pages.
const SELECTION_PARAMS: &[&str] = &["titles", "pageids", "revids"];

fn specifies_any(params: &Params, keys: &[&str]) -> bool {
    keys.iter().any(|key| {
        params
            .get(*key)
            .is_some_and(|value| value.is_file() || value.encode_text().is_some())
    })
}

/// Whether one side uses a generator while the other names pages directly.
fn modes_conflict(a: &Params, b: &Params) -> bool {
    (specifies_any(a, GENERATOR_PARAMS) && specifies_any(b, SELECTION_PARAMS))
        || (specifies_any(a, SELECTION_PARAMS) && specifies_any(b, GENERATOR_PARAMS))
}

fn combine_values(a: &ParamValue, b: &ParamValue) -> Option<ParamValue> {
    match (a, b) {
        (ParamValue::Set(x), ParamValue::Set(y)) => {
            if a.encode_text() == b.encode_text() {
                return Some(a.clone());
            }
            let mut union: Vec<&String> = x.union(y).collect();
            union.sort();
            Some(ParamValue::Set(union.into_iter().cloned().collect::<IndexSet<_>>()))
        }
        (ParamValue::File(x), ParamValue::File(y)) => (x == y).then(|| a.clone()),
        (ParamValue::Scalar(_), ParamValue::Scalar(_)) | (ParamValue::List(_), ParamValue::List(_)) => {
            (a.encode_text() == b.encode_text()).then(|| a.clone())
        }
        _ => None,
    }
}

/// Merge two parameter maps, or `None` if they are incompatible.
///
/// Keys present on one side only are copied. Keys present on both sides
/// must encode identically, except that two differing sets are unioned
/// (sorted, so the result does not depend on argument order).
pub fn combine_params(a: &Params, b: &Params) -> Option<Params> {
    if modes_conflict(a, b) {
        return None;
    }

    let mut merged = Params::with_capacity(a.len() + b.len());
    for (key, value_a) in a {
        let value = match b.get(key) {
            Some(value_b) => combine_values(value_a, value_b)?,
            None => value_a.clone(),
        };
        merged.insert(key.clone(), value);
    }
    for (key, value_b) in b {
        if !a.contains_key(key) {
            merged.insert(key.clone(), value_b.clone());
        }
    }
    Some(merged)
}

/// Combine one option. `None` on the outside means incompatible; an inner
/// `None` means the option stays at its default. Explicit values equal to
/// the default count as unset.
fn combine_option<T: PartialEq + Clone>(
    a: Option<&T>,
    b: Option<&T>,
    default: Option<&T>,
) -> Option<Option<T>> {
    let a = a.filter(|value| Some(*value) != default);
    let b = b.filter(|value| Some(*value) != default);
    match (a, b) {
        (None, None) => Some(None),
        (Some(value), None) | (None, Some(value)) => Some(Some(value.clone())),
        (Some(x), Some(y)) if x == y => Some(Some(x.clone())),
        _ => None,
    }
}

/// Each caller's effective handler sees the warnings; an unset side stands
/// for the default handler.
fn combine_warn(
    a: Option<&WarnHandler>,
    b: Option<&WarnHandler>,
    default: &WarnHandler,
) -> Option<WarnHandler> {
    if a.is_none() && b.is_none() {
        return None;
    }
    let first = Arc::clone(a.unwrap_or(default));
    let second = Arc::clone(b.unwrap_or(default));
    Some(Arc::new(move |warnings| {
        first(warnings);
        second(warnings);
    }))
}

/// Merge two per-call option layers, or `None` if they are incompatible.
///
/// `defaults` is the view the layers will be resolved against; a value
/// equal to its default never conflicts with an explicit one.
pub fn combine_options(
    a: &RequestOptions,
    b: &RequestOptions,
    defaults: &Options,
) -> Option<RequestOptions> {
    let (token_type, token_name) = match (&a.token_type, &b.token_type) {
        (None, None) => (None, a.token_name.clone().or_else(|| b.token_name.clone())),
        (Some(x), Some(y)) if x == y => (
            Some(x.clone()),
            combine_option(a.token_name.as_ref(), b.token_name.as_ref(), Some(&defaults.token_name))?,
        ),
        _ => return None,
    };

    let mut extensions = a.extensions.clone();
    for (key, value_b) in &b.extensions {
        let combined = combine_option(
            a.extensions.get(key),
            Some(value_b),
            defaults.extensions.get(key),
        )?;
        match combined {
            Some(value) => {
                extensions.insert(key.clone(), value);
            }
            None => {
                extensions.shift_remove(key);
            }
        }
    }

    Some(RequestOptions {
        method: combine_option(a.method.as_ref(), b.method.as_ref(), Some(&defaults.method))?,
        max_retries_seconds: combine_option(
            a.max_retries_seconds.as_ref(),
            b.max_retries_seconds.as_ref(),
            Some(&defaults.max_retries_seconds),
        )?,
        retry_after_maxlag_seconds: combine_option(
            a.retry_after_maxlag_seconds.as_ref(),
            b.retry_after_maxlag_seconds.as_ref(),
            Some(&defaults.retry_after_maxlag_seconds),
        )?,
        retry_after_readonly_seconds: combine_option(
            a.retry_after_readonly_seconds.as_ref(),
            b.retry_after_readonly_seconds.as_ref(),
            Some(&defaults.retry_after_readonly_seconds),
        )?,
        warn: combine_warn(a.warn.as_ref(), b.warn.as_ref(), &defaults.warn),
        drop_truncated_result_warning: combine_option(
            a.drop_truncated_result_warning.as_ref(),
            b.drop_truncated_result_warning.as_ref(),
            Some(&defaults.drop_truncated_result_warning),
        )?,
        token_type,
        token_name,
        user_agent: combine_option(
            a.user_agent.as_ref(),
            b.user_agent.as_ref(),
            defaults.user_agent.as_ref(),
        )?,
        authorization: combine_option(
            a.authorization.as_ref(),
            b.authorization.as_ref(),
            defaults.authorization.as_ref(),
        )?,
        extensions,
    })
}
