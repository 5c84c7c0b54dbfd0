//! `%{COLLECTION.key}` macro expansion against a transaction's variables.
//!
//! Used by `msg`, `logdata`, `setvar`, `redirect` and by operator parameters.
//! A macro names either a plain variable (`%{MATCHED_VAR}`) or a collection
//! member (`%{tx.anomaly_score}` → `TX:anomaly_score`). Unknown names expand to
//! the empty string.

use std::borrow::Cow;

use crate::collection::{COLLECTION_SEPARATOR, Collection};

const OPEN: &str = "%{";
const CLOSE: char = '}';

/// Whether `s` contains anything to expand.
pub fn has_macros(s: &str) -> bool {
    s.contains(OPEN)
}

/// Expand every macro in `template`. Borrows when there is nothing to do.
pub fn expand<'a>(template: &'a str, vars: &dyn Collection) -> Cow<'a, str> {
    if !has_macros(template) {
        return Cow::Borrowed(template);
    }

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after = &rest[start + OPEN.len()..];
        let Some(end) = after.find(CLOSE) else {
            // Unterminated: keep the remainder literally.
            out.push_str(&rest[start..]);
            return Cow::Owned(out);
        };
        out.push_str(&lookup(&after[..end], vars));
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Map a macro name to its store key: `tx.score` → `TX:score`.
pub fn macro_key(name: &str) -> String {
    match name.split_once('.') {
        Some((collection, key)) => format!(
            "{}{COLLECTION_SEPARATOR}{key}",
            collection.trim().to_ascii_uppercase()
        ),
        None => name.trim().to_ascii_uppercase(),
    }
}

fn lookup(name: &str, vars: &dyn Collection) -> String {
    let key = macro_key(name);
    if let Some(v) = vars.resolve_first(&key) {
        return v.to_string();
    }

    // Sub-keys such as header names are stored as received; fall back to a
    // case-insensitive search within the collection.
    if let Some((collection, _)) = key.split_once(COLLECTION_SEPARATOR)
        && let Some(var) = vars
            .resolve_multi_matches(collection)
            .into_iter()
            .rev()
            .find(|v| v.key.eq_ignore_ascii_case(&key))
    {
        return var.value;
    }
    String::new()
}
