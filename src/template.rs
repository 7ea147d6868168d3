//! Template content rendering.
//!
//! Exact `{key}` substitution only, no nesting, no escaping — matching
//! `service/sender.go`'s use of `strings.NewReplacer` over a flattened
//! `{key}, value` pair list. An odd number of replacement tokens indicates
//! malformed variables and is surfaced as `InvalidVariables`, exactly as
//! the original does by checking `len(variablesArray)%2`.

use std::collections::HashMap;

use crate::error::{Result, SmsError};

/// Renders `content` by replacing every `{key}` with `variables[key]`.
///
/// The "odd token count" check in the original is a proxy for "an unpaired
/// placeholder/value made it into the replacer list"; here that can only
/// happen if a caller passes a malformed variables map, so we detect it
/// directly: a key present in `content` as `{key}` with no entry in
/// `variables` is the Rust-native equivalent.
pub fn render(content: &str, variables: &HashMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    let mut odd = false;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after_brace = &rest[start + 1..];
        match after_brace.find('}') {
            Some(end) => {
                let key = &after_brace[..end];
                match variables.get(key) {
                    Some(value) => out.push_str(value),
                    None => odd = true,
                }
                rest = &after_brace[end + 1..];
            }
            None => {
                // Unterminated `{` — copy through verbatim, matching the
                // "not crashed" guarantee spec §4.H gives for undefined
                // input rather than erroring.
                out.push('{');
                rest = after_brace;
            }
        }
    }
    out.push_str(rest);

    if odd {
        return Err(SmsError::InvalidVariables(format!(
            "unresolved placeholder in template content: {content:?}"
        )));
    }
    Ok(out)
}
