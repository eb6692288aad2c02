//! Annotation value DSL: a comma-separated list of `key=value` pairs.

use super::ParameterError;
use std::collections::HashMap;
use std::str::FromStr;

/// Parsed `key=value` pairs of one annotation value.
#[derive(Debug)]
pub(crate) struct Pairs<'a> {
    annotation: &'a str,
    values: HashMap<String, String>,
}

/// Strip one layer of matching `"` or `'` quotes around a whole value.
pub fn strip_quotes(value: &str) -> &str {
    let trimmed = value.trim();
    for quote in ['"', '\''] {
        if trimmed.len() >= 2 && trimmed.starts_with(quote) && trimmed.ends_with(quote) {
            return &trimmed[1..trimmed.len() - 1];
        }
    }
    trimmed
}

pub(crate) fn parse<'a>(annotation: &'a str, value: &str) -> Result<Pairs<'a>, ParameterError> {
    let mut values = HashMap::new();
    for piece in strip_quotes(value).split(',') {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        let Some((key, val)) = piece.split_once('=') else {
            return Err(ParameterError::Malformed {
                annotation: annotation.to_string(),
                reason: format!("expected key=value, found '{piece}'"),
            });
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(ParameterError::Malformed {
                annotation: annotation.to_string(),
                reason: format!("empty key in '{piece}'"),
            });
        }
        // Later duplicates win, matching properties-file semantics.
        values.insert(key.to_string(), val.trim().to_string());
    }
    Ok(Pairs { annotation, values })
}

impl Pairs<'_> {
    pub(crate) fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub(crate) fn get_owned(&self, key: &str) -> Option<String> {
        self.get(key).map(str::to_string)
    }

    pub(crate) fn required(&self, key: &'static str) -> Result<&str, ParameterError> {
        self.get(key).ok_or_else(|| ParameterError::MissingKey {
            annotation: self.annotation.to_string(),
            key,
        })
    }

    /// Parse an optional key with `FromStr`, reporting the key on failure.
    pub(crate) fn parse_optional<T: FromStr>(
        &self,
        key: &'static str,
    ) -> Result<Option<T>, ParameterError> {
        self.get(key)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|_parse_error| self.invalid(key, raw))
            })
            .transpose()
    }

    pub(crate) fn parse_required<T: FromStr>(&self, key: &'static str) -> Result<T, ParameterError> {
        let raw = self.required(key)?;
        raw.parse::<T>().map_err(|_parse_error| self.invalid(key, raw))
    }

    pub(crate) fn invalid(&self, key: &'static str, value: &str) -> ParameterError {
        ParameterError::InvalidValue {
            annotation: self.annotation.to_string(),
            key,
            value: value.to_string(),
        }
    }

    pub(crate) fn annotation(&self) -> &str {
        self.annotation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pairs_keeps_base64_padding() {
        let pairs = parse("secret.x/app.db", "kind=REFERENCE, localModeValue=cGFzc3dvcmQ=").unwrap();
        assert_eq!(pairs.get("kind"), Some("REFERENCE"));
        assert_eq!(pairs.get("localModeValue"), Some("cGFzc3dvcmQ="));
    }

    #[test]
    fn test_parse_pairs_strips_whole_value_quotes() {
        let pairs = parse("a", "\"kind=DYNAMIC,size=128\"").unwrap();
        assert_eq!(pairs.get("size"), Some("128"));
        let pairs = parse("a", "'kind=DYNAMIC'").unwrap();
        assert_eq!(pairs.get("kind"), Some("DYNAMIC"));
    }

    #[test]
    fn test_parse_pairs_rejects_piece_without_equals() {
        let err = parse("secret.x/broken", "kind=DYNAMIC,oops").unwrap_err();
        assert_eq!(err.annotation(), "secret.x/broken");
    }

    #[test]
    fn test_parse_optional_reports_key() {
        let pairs = parse("a", "size=big").unwrap();
        let err = pairs.parse_optional::<u32>("size").unwrap_err();
        assert!(
            matches!(err, ParameterError::InvalidValue { key: "size", .. }),
            "unexpected error {err:?}"
        );
    }
}
