//! Repair of the non-standard JSON some firmware emits.

use super::{ARRAY_END, ESCAPE, OBJECT_END, QUOTE, SEPARATOR};
use std::borrow::Cow;

/// Bare tokens for non-finite numbers. JSON has no representation for them.
const NON_FINITE: [&str; 3] = ["NaN", "Infinity", "-Infinity"];

/// The value substituted for a non-finite number.
const NULL: &str = "null";

/// Make near-JSON text parseable.
///
/// Outside of strings:
///
/// * commas that directly precede (ignoring whitespace) a closing brace or
///   bracket are removed, along with that whitespace,
/// * the non-finite numbers `NaN`, `Infinity` and `-Infinity` are replaced
///   with `null`.
///
/// Strings are left untouched. This is not a general purpose JSON fixer: any
/// other defect is left for the parser to reject.
///
/// ```
/// # use pika_serial::frame::sanitize;
/// assert_eq!(sanitize(r#"{"a": [1, 2, ], "b": ",}",}"#), r#"{"a": [1, 2], "b": ",}"}"#);
/// assert_eq!(sanitize(r#"{"a": NaN, "b": "NaN"}"#), r#"{"a": null, "b": "NaN"}"#);
/// ```
pub fn sanitize(text: &str) -> Cow<'_, str> {
    if !text
        .bytes()
        .any(|b| b == SEPARATOR || b == b'N' || b == b'I')
    {
        return Cow::Borrowed(text);
    }

    let mut output = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    // Characters before this byte index have already been handled.
    let mut resume_at = 0;
    for (index, ch) in text.char_indices() {
        if index < resume_at {
            continue;
        }
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == char::from(ESCAPE) {
                escaped = true;
            } else if ch == char::from(QUOTE) {
                in_string = false;
            }
        } else if ch == char::from(QUOTE) {
            in_string = true;
        } else if ch == char::from(SEPARATOR) {
            let rest = text[index + 1..].trim_start();
            if rest.starts_with(|c| c == char::from(OBJECT_END) || c == char::from(ARRAY_END)) {
                resume_at = text.len() - rest.len();
                continue;
            }
        } else if let Some(token) = NON_FINITE
            .iter()
            .find(|token| text[index..].starts_with(*token))
        {
            output.push_str(NULL);
            resume_at = index + token.len();
            continue;
        }
        output.push(ch);
    }
    Cow::Owned(output)
}
