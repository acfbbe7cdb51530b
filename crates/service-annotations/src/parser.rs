//! Prefix-aware accessors over a Service's annotation map.
//!
//! All annotation names used by the controller live under one configurable
//! prefix (`nlb.service.kubernetes.io` by default). The prefix is passed in
//! explicitly so several controllers with different prefixes can coexist.

use crate::error::AnnotationError;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Default annotation prefix.
pub const DEFAULT_ANNOTATION_PREFIX: &str = "nlb.service.kubernetes.io";

/// Reads typed values from `<prefix>/<name>` annotations.
#[derive(Debug, Clone)]
pub struct AnnotationParser<'a> {
    prefix: &'a str,
    annotations: &'a BTreeMap<String, String>,
}

impl<'a> AnnotationParser<'a> {
    /// Create a parser for `annotations` under `prefix`.
    #[must_use]
    pub fn new(prefix: &'a str, annotations: &'a BTreeMap<String, String>) -> Self {
        Self { prefix, annotations }
    }

    /// Full annotation key for `name`.
    #[must_use]
    pub fn key(&self, name: &str) -> String {
        format!("{}/{}", self.prefix, name)
    }

    /// Trimmed value of `name`; empty values count as absent.
    #[must_use]
    pub fn get_string(&self, name: &str) -> Option<&'a str> {
        self.annotations
            .get(&self.key(name))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Parse `name` with `FromStr`, falling back to `default` when absent.
    pub fn get_parsed<T>(&self, name: &str, default: T) -> Result<T, AnnotationError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_string(name) {
            Some(raw) => raw
                .parse()
                .map_err(|e: T::Err| AnnotationError::invalid(&self.key(name), e.to_string())),
            None => Ok(default),
        }
    }

    /// Integer value of `name`, falling back to `default` when absent.
    pub fn get_int(&self, name: &str, default: i32) -> Result<i32, AnnotationError> {
        match self.get_string(name) {
            Some(raw) => raw.parse().map_err(|_| {
                AnnotationError::invalid(&self.key(name), format!("`{raw}` is not an integer"))
            }),
            None => Ok(default),
        }
    }

    /// Comma separated list; blank entries are dropped.
    #[must_use]
    pub fn get_string_slice(&self, name: &str) -> Vec<String> {
        self.get_string(name)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `key=value` comma separated list. Entries without exactly one `=` are rejected together.
    pub fn get_key_values(&self, name: &str) -> Result<BTreeMap<String, String>, AnnotationError> {
        parse_key_values(self.get_string(name).unwrap_or_default()).map_err(|bad| {
            AnnotationError::invalid(
                &self.key(name),
                format!("unable to parse `{}` into Key=Value pair(s)", bad.join(", ")),
            )
        })
    }

    /// Every `<prefix>/<name>.<suffix>` annotation, keyed by suffix.
    #[must_use]
    pub fn get_prefixed(&self, name: &str) -> BTreeMap<String, &'a str> {
        let head = format!("{}.", self.key(name));
        self.annotations
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(&head)
                    .filter(|suffix| !suffix.is_empty())
                    .map(|suffix| (suffix.to_string(), v.as_str()))
            })
            .collect()
    }
}

/// Parse a `k1=v1, k2=v2` list. On failure returns every malformed entry.
pub fn parse_key_values(raw: &str) -> Result<BTreeMap<String, String>, Vec<String>> {
    let mut pairs = BTreeMap::new();
    let mut bad = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match entry.split('=').collect::<Vec<_>>().as_slice() {
            [k, v] if !k.trim().is_empty() => {
                pairs.insert(k.trim().to_string(), v.trim().to_string());
            }
            _ => bad.push(entry.to_string()),
        }
    }
    if bad.is_empty() { Ok(pairs) } else { Err(bad) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotations(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (format!("{DEFAULT_ANNOTATION_PREFIX}/{k}"), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_get_string_ignores_blank_values() {
        let annos = annotations(&[("scheme", "  "), ("subnets", " a ")]);
        let parser = AnnotationParser::new(DEFAULT_ANNOTATION_PREFIX, &annos);
        assert_eq!(parser.get_string("scheme"), None);
        assert_eq!(parser.get_string("subnets"), Some("a"));
    }

    #[test]
    fn test_prefix_is_respected() {
        let annos = annotations(&[("scheme", "internal")]);
        let parser = AnnotationParser::new("other.example.com", &annos);
        assert_eq!(parser.get_string("scheme"), None);
    }

    #[test]
    fn test_string_slice() {
        let annos = annotations(&[("subnets", "subnet-a, prod-b,,")]);
        let parser = AnnotationParser::new(DEFAULT_ANNOTATION_PREFIX, &annos);
        assert_eq!(parser.get_string_slice("subnets"), vec!["subnet-a", "prod-b"]);
    }

    #[test]
    fn test_key_values_reports_every_bad_entry() {
        let annos = annotations(&[("tags", "team=net, broken, a=b=c, env = prod")]);
        let parser = AnnotationParser::new(DEFAULT_ANNOTATION_PREFIX, &annos);
        let err = parser.get_key_values("tags").unwrap_err();
        assert!(err.to_string().contains("broken, a=b=c"), "{err}");

        let annos = annotations(&[("tags", "team=net, env = prod")]);
        let parser = AnnotationParser::new(DEFAULT_ANNOTATION_PREFIX, &annos);
        let tags = parser.get_key_values("tags").unwrap();
        assert_eq!(tags.get("env").map(String::as_str), Some("prod"));
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn test_get_int_rejects_garbage() {
        let annos = annotations(&[("healthcheck-interval-seconds", "ten")]);
        let parser = AnnotationParser::new(DEFAULT_ANNOTATION_PREFIX, &annos);
        assert!(parser.get_int("healthcheck-interval-seconds", 10).is_err());
        assert_eq!(parser.get_int("healthy-threshold-count", 3).unwrap(), 3);
    }

    #[test]
    fn test_get_prefixed() {
        let annos = annotations(&[("actions.blue", "{}"), ("actions.", "x"), ("actionsfoo", "y")]);
        let parser = AnnotationParser::new(DEFAULT_ANNOTATION_PREFIX, &annos);
        let actions = parser.get_prefixed("actions");
        assert_eq!(actions.len(), 1);
        assert_eq!(actions.get("blue"), Some(&"{}"));
    }
}
