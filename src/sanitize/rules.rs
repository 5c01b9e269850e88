//! Sanitizer rule definitions.
//!
//! Rules are declared in snake_case (Rust and TOML) and rendered to the
//! proxy's camelCase JSON only when a batch is submitted.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The sanitizer families the proxy understands.
///
/// Declaration order is the order kinds appear in a submitted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SanitizerKind {
    /// Drop named headers.
    RemoveHeader,
    /// Drop OAuth token exchanges entirely.
    OAuthResponse,
    /// Mask a JSON body value located by JSON path.
    BodyKey,
    /// Mask body text matching a regex.
    BodyRegex,
    /// Mask text matching a regex anywhere in the interaction.
    GeneralRegex,
    /// Mask a header value.
    HeaderRegex,
    /// Mask URI text matching a regex.
    UriRegex,
}

impl SanitizerKind {
    /// All kinds in batch order.
    pub const ALL: [SanitizerKind; 7] = [
        Self::RemoveHeader,
        Self::OAuthResponse,
        Self::BodyKey,
        Self::BodyRegex,
        Self::GeneralRegex,
        Self::HeaderRegex,
        Self::UriRegex,
    ];

    /// Sanitizer name on the wire.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::RemoveHeader => "RemoveHeaderSanitizer",
            Self::OAuthResponse => "OAuthResponseSanitizer",
            Self::BodyKey => "BodyKeySanitizer",
            Self::BodyRegex => "BodyRegexSanitizer",
            Self::GeneralRegex => "GeneralRegexSanitizer",
            Self::HeaderRegex => "HeaderRegexSanitizer",
            Self::UriRegex => "UriRegexSanitizer",
        }
    }
}

/// Parameters shared by the regex-based sanitizers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexParams {
    /// Pattern to match.
    pub regex: String,
    /// Replacement text.
    pub value: String,
    /// Named capture group to replace instead of the whole match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_for_replace: Option<String>,
}

impl RegexParams {
    /// Replace the whole match.
    pub fn new(regex: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            regex: regex.into(),
            value: value.into(),
            group_for_replace: None,
        }
    }

    /// Replace only the named group.
    pub fn group(
        regex: impl Into<String>,
        group: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            group_for_replace: Some(group.into()),
            ..Self::new(regex, value)
        }
    }
}

/// Override of the proxy's default request matcher.
///
/// Serializes in snake_case like every other rule; [`wire_body`](Self::wire_body)
/// renders the proxy's camelCase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultMatcher {
    /// Compare request bodies when matching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare_bodies: Option<bool>,
    /// Comma-separated headers excluded from matching entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excluded_headers: Option<String>,
    /// Comma-separated headers whose presence matters but value does not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignored_headers: Option<String>,
    /// Ignore query parameter ordering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_query_ordering: Option<bool>,
    /// Comma-separated query parameters ignored when matching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignored_query_parameters: Option<String>,
}

impl DefaultMatcher {
    /// Value of the abstraction header selecting the custom default matcher.
    pub const ABSTRACTION_ID: &'static str = "CustomDefaultMatcher";

    /// camelCase request body for `/Admin/SetMatcher`. Unset fields are omitted.
    pub fn wire_body(&self) -> Map<String, Value> {
        let mut body = Map::new();
        if let Some(compare) = self.compare_bodies {
            body.insert("compareBodies".to_string(), Value::Bool(compare));
        }
        if let Some(headers) = &self.excluded_headers {
            body.insert("excludedHeaders".to_string(), Value::String(headers.clone()));
        }
        if let Some(headers) = &self.ignored_headers {
            body.insert("ignoredHeaders".to_string(), Value::String(headers.clone()));
        }
        if let Some(ignore) = self.ignore_query_ordering {
            body.insert("ignoreQueryOrdering".to_string(), Value::Bool(ignore));
        }
        if let Some(params) = &self.ignored_query_parameters {
            body.insert(
                "ignoredQueryParameters".to_string(),
                Value::String(params.clone()),
            );
        }
        body
    }
}

/// One masking or removal instruction for the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SanitizerRule {
    /// Remove a comma-separated list of headers.
    RemoveHeader {
        /// Header names, comma-separated.
        headers: String,
    },
    /// Replace the default matcher. Not a sanitizer on the wire.
    DefaultMatcher(DefaultMatcher),
    /// Remove OAuth responses.
    #[serde(rename = "oauth_response")]
    OAuthResponse,
    /// Mask a JSON body value.
    BodyKey {
        /// JSON path selecting the value.
        json_path: String,
        /// Replacement value.
        value: String,
        /// Only replace text within the value matching this pattern.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        regex: Option<String>,
        /// Named capture group of `regex` to replace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group_for_replace: Option<String>,
    },
    /// Mask body text.
    BodyRegex(RegexParams),
    /// Mask text anywhere.
    GeneralRegex(RegexParams),
    /// Mask a header value.
    HeaderRegex {
        /// Header name.
        key: String,
        /// Replacement value.
        value: String,
        /// Only replace text within the header matching this pattern.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        regex: Option<String>,
        /// Named capture group of `regex` to replace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group_for_replace: Option<String>,
    },
    /// Mask URI text.
    UriRegex(RegexParams),
}

impl SanitizerRule {
    /// Mask a JSON body value with `value`.
    pub fn body_key(json_path: impl Into<String>, value: impl Into<String>) -> Self {
        Self::BodyKey {
            json_path: json_path.into(),
            value: value.into(),
            regex: None,
            group_for_replace: None,
        }
    }

    /// Mask a header value with `value`.
    pub fn header(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::HeaderRegex {
            key: key.into(),
            value: value.into(),
            regex: None,
            group_for_replace: None,
        }
    }

    /// Sanitizer family, or `None` for the matcher override.
    pub fn kind(&self) -> Option<SanitizerKind> {
        match self {
            Self::RemoveHeader { .. } => Some(SanitizerKind::RemoveHeader),
            Self::DefaultMatcher(_) => None,
            Self::OAuthResponse => Some(SanitizerKind::OAuthResponse),
            Self::BodyKey { .. } => Some(SanitizerKind::BodyKey),
            Self::BodyRegex(_) => Some(SanitizerKind::BodyRegex),
            Self::GeneralRegex(_) => Some(SanitizerKind::GeneralRegex),
            Self::HeaderRegex { .. } => Some(SanitizerKind::HeaderRegex),
            Self::UriRegex(_) => Some(SanitizerKind::UriRegex),
        }
    }

    /// camelCase request body for the proxy, `None` for parameterless kinds.
    pub fn wire_body(&self) -> Option<Map<String, Value>> {
        let mut body = Map::new();
        let mut put = |key: &str, value: Option<&String>| {
            if let Some(value) = value {
                body.insert(key.to_string(), Value::String(value.clone()));
            }
        };

        match self {
            Self::DefaultMatcher(_) | Self::OAuthResponse => return None,
            Self::RemoveHeader { headers } => put("headersForRemoval", Some(headers)),
            Self::BodyKey {
                json_path,
                value,
                regex,
                group_for_replace,
            } => {
                put("jsonPath", Some(json_path));
                put("value", Some(value));
                put("regex", regex.as_ref());
                put("groupForReplace", group_for_replace.as_ref());
            }
            Self::HeaderRegex {
                key,
                value,
                regex,
                group_for_replace,
            } => {
                put("key", Some(key));
                put("value", Some(value));
                put("regex", regex.as_ref());
                put("groupForReplace", group_for_replace.as_ref());
            }
            Self::BodyRegex(params) | Self::GeneralRegex(params) | Self::UriRegex(params) => {
                put("regex", Some(&params.regex));
                put("value", Some(&params.value));
                put("groupForReplace", params.group_for_replace.as_ref());
            }
        }
        Some(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_body_key_wire_body_is_camel_case() {
        let body = SanitizerRule::body_key("$..access_token", "Sanitized")
            .wire_body()
            .unwrap();
        assert_eq!(
            Value::Object(body),
            json!({"jsonPath": "$..access_token", "value": "Sanitized"})
        );
    }

    #[test]
    fn test_group_for_replace_is_rendered() {
        let rule = SanitizerRule::UriRegex(RegexParams::group("sig=(?<sig>[^&]+)", "sig", "Sanitized"));
        let body = rule.wire_body().unwrap();
        assert_eq!(body["groupForReplace"], json!("sig"));
        assert_eq!(body["regex"], json!("sig=(?<sig>[^&]+)"));
    }

    #[test]
    fn test_parameterless_kinds_have_no_body() {
        assert!(SanitizerRule::OAuthResponse.wire_body().is_none());
        assert!(
            SanitizerRule::DefaultMatcher(DefaultMatcher::default())
                .wire_body()
                .is_none()
        );
    }

    #[test]
    fn test_matcher_has_no_kind() {
        assert_eq!(SanitizerRule::DefaultMatcher(DefaultMatcher::default()).kind(), None);
        assert_eq!(SanitizerRule::OAuthResponse.kind(), Some(SanitizerKind::OAuthResponse));
    }

    #[test]
    fn test_rules_parse_from_toml() {
        #[derive(Deserialize)]
        struct Doc {
            rules: Vec<SanitizerRule>,
        }

        let doc: Doc = toml::from_str(
            r#"
            [[rules]]
            kind = "body_key"
            json_path = "$..secret"
            value = "Sanitized"

            [[rules]]
            kind = "uri_regex"
            regex = "sig=(?<sig>[^&]+)"
            group_for_replace = "sig"
            value = "Sanitized"

            [[rules]]
            kind = "oauth_response"

            [[rules]]
            kind = "default_matcher"
            excluded_headers = "Authorization"
            "#,
        )
        .unwrap();

        assert_eq!(doc.rules[0], SanitizerRule::body_key("$..secret", "Sanitized"));
        assert_eq!(
            doc.rules[1],
            SanitizerRule::UriRegex(RegexParams::group("sig=(?<sig>[^&]+)", "sig", "Sanitized"))
        );
        assert_eq!(doc.rules[2], SanitizerRule::OAuthResponse);
        assert!(matches!(doc.rules[3], SanitizerRule::DefaultMatcher(_)));
    }

    #[test]
    fn test_matcher_wire_body_is_camel_case() {
        let matcher = DefaultMatcher {
            excluded_headers: Some("Authorization".to_string()),
            compare_bodies: Some(false),
            ..Default::default()
        };
        assert_eq!(
            Value::Object(matcher.wire_body()),
            json!({"compareBodies": false, "excludedHeaders": "Authorization"})
        );
    }

    #[test]
    fn test_matcher_rule_round_trips_through_toml() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Rules {
            rules: Vec<SanitizerRule>,
        }

        let rules = Rules {
            rules: vec![SanitizerRule::DefaultMatcher(DefaultMatcher {
                compare_bodies: Some(false),
                excluded_headers: Some("Authorization".to_string()),
                ignore_query_ordering: Some(true),
                ..Default::default()
            })],
        };
        let text = toml::to_string(&rules).unwrap();
        assert!(text.contains("compare_bodies = false"), "{text}");
        assert_eq!(toml::from_str::<Rules>(&text).unwrap(), rules);
    }
}
