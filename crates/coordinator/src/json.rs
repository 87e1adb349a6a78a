//! Extraction of JSON objects embedded in model replies.

use crew_common::{CrewError, Result};
use serde::de::DeserializeOwned;

/// Length of the balanced object opening at the start of `s`, if any.
/// Braces inside string literals are ignored.
fn balanced_len(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Balanced `{...}` spans of `s` in order of appearance. Scanning resumes
/// after each span found, so nested objects are not yielded separately.
pub fn json_object_candidates(s: &str) -> impl Iterator<Item = &str> {
    let mut cursor = 0;
    std::iter::from_fn(move || {
        while let Some(offset) = s[cursor..].find('{') {
            let start = cursor + offset;
            match balanced_len(&s[start..]) {
                Some(len) => {
                    cursor = start + len;
                    return Some(&s[start..start + len]);
                }
                None => cursor = start + 1,
            }
        }
        cursor = s.len();
        None
    })
}

/// Deserialize the first embedded object that parses as `T`.
///
/// Prose such as `con {FA} persistente` before the real object is skipped.
/// When no candidate parses, the error of the first one is returned.
pub fn parse_embedded<T: DeserializeOwned>(text: &str) -> Result<T> {
    let mut first_error = None;
    for candidate in json_object_candidates(text) {
        match serde_json::from_str(candidate) {
            Ok(value) => return Ok(value),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e.into()),
        None => Err(CrewError::InvalidInput(
            "no JSON object found in model reply".into(),
        )),
    }
}
