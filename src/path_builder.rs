//! Path Builder: turns a `{tag}` template and a key/value data set into a
//! sanitized relative filesystem path. Pure, no I/O.

use std::collections::BTreeMap;
use std::fmt;

/// The closed set of placeholder names a template may reference.
pub const KNOWN_TAGS: &[&str] = &[
    "modelId",
    "modelName",
    "modelType",
    "creatorName",
    "username",
    "versionId",
    "versionName",
    "baseModel",
    "imageId",
];

/// Errors raised while resolving a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathBuilderError {
    UnknownTag(String),
    InvalidTemplate(String),
}

impl fmt::Display for PathBuilderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTag(tag) => write!(f, "unknown path template tag: {tag}"),
            Self::InvalidTemplate(reason) => write!(f, "invalid path template: {reason}"),
        }
    }
}

impl std::error::Error for PathBuilderError {}

/// Lowercases `value`, replaces runs of non-alphanumeric characters with a
/// single underscore, and trims leading/trailing underscores.
#[must_use]
pub fn slug(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut last_was_separator = false;

    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() {
            result.push(ch.to_ascii_lowercase());
            last_was_separator = false;
        } else if !last_was_separator {
            result.push('_');
            last_was_separator = true;
        }
    }

    result.trim_matches('_').to_string()
}

/// Renders `template` against `data`, substituting `{tag}` placeholders.
///
/// Unknown tags are an error. A tag with an empty or absent value in `data`
/// is rendered as `empty_<tagName>`. The resulting path is guaranteed to be
/// relative and free of `..` segments.
///
/// # Errors
///
/// Returns [`PathBuilderError::UnknownTag`] if the template references a
/// name outside [`KNOWN_TAGS`], or [`PathBuilderError::InvalidTemplate`] if
/// a `{` is left unterminated.
pub fn build_path(
    template: &str,
    data: &BTreeMap<&str, &str>,
) -> Result<String, PathBuilderError> {
    let mut output = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '{' {
            output.push(ch);
            continue;
        }

        let mut tag = String::new();
        let mut closed = false;
        for next in chars.by_ref() {
            if next == '}' {
                closed = true;
                break;
            }
            tag.push(next);
        }

        if !closed {
            return Err(PathBuilderError::InvalidTemplate(format!(
                "unterminated placeholder starting at '{{{tag}'"
            )));
        }

        if !KNOWN_TAGS.contains(&tag.as_str()) {
            return Err(PathBuilderError::UnknownTag(tag));
        }

        let value = data.get(tag.as_str()).copied().unwrap_or("");
        if value.is_empty() {
            output.push_str(&format!("empty_{tag}"));
        } else {
            output.push_str(&slug(value));
        }
    }

    Ok(sanitize_relative(&output))
}

/// Strips any leading separators and collapses `..` segments produced by a
/// substituted value, guaranteeing the result is relative and contains no
/// directory traversal.
fn sanitize_relative(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_tags_with_slugged_values() {
        let mut data = BTreeMap::new();
        data.insert("modelType", "Checkpoint");
        data.insert("modelName", "Some Cool Model!");
        data.insert("versionId", "12345");

        let result = build_path("{modelType}/{modelName}/{versionId}", &data).unwrap();
        assert_eq!(result, "checkpoint/some_cool_model/12345");
    }

    #[test]
    fn unknown_tag_is_an_error() {
        let data = BTreeMap::new();
        let result = build_path("{bogus}", &data);
        assert_eq!(result, Err(PathBuilderError::UnknownTag("bogus".to_string())));
    }

    #[test]
    fn missing_value_becomes_empty_sentinel() {
        let data = BTreeMap::new();
        let result = build_path("{versionName}", &data).unwrap();
        assert_eq!(result, "empty_versionName");
    }

    #[test]
    fn result_never_contains_dotdot_or_braces() {
        let mut data = BTreeMap::new();
        data.insert("modelName", "../../etc/passwd");
        let result = build_path("{modelName}", &data).unwrap();
        assert!(!result.contains(".."));
        assert!(!result.contains('{'));
        assert!(!result.contains('}'));
    }

    #[test]
    fn result_is_always_relative() {
        let mut data = BTreeMap::new();
        data.insert("modelName", "/absolute/path");
        let result = build_path("{modelName}", &data).unwrap();
        assert!(!result.starts_with('/'));
    }

    #[test]
    fn unterminated_placeholder_is_invalid_template() {
        let data = BTreeMap::new();
        let result = build_path("{modelName", &data);
        assert!(matches!(result, Err(PathBuilderError::InvalidTemplate(_))));
    }

    #[test]
    fn is_pure_across_repeated_calls() {
        let mut data = BTreeMap::new();
        data.insert("versionId", "7");
        let first = build_path("{versionId}", &data).unwrap();
        let second = build_path("{versionId}", &data).unwrap();
        assert_eq!(first, second);
    }
}
