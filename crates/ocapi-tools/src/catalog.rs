//! Endpoint catalog: the fixed list of OCAPI endpoints exposed as tools.
//!
//! The catalog is loaded once at startup and shared read-only afterwards. The file format is
//! `{ "endpoints": [ ... ] }` in JSON, or the same shape in YAML when the file extension is
//! `.yaml` / `.yml`.

use crate::error::{OcapiToolsError, Result};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// One OCAPI endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDescriptor {
    /// Path template relative to the Data API root, e.g. `/sites/{site_id}/campaign_search`.
    pub path: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub params: Vec<ParamSpec>,
    /// Body sent for POST/PUT/PATCH calls when nothing else produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_body: Option<Value>,
    /// Explicit tool name; bypasses generated naming (uniqueness still applies).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl EndpointDescriptor {
    /// Names of `{placeholder}` segments in the path template, in order of appearance.
    #[must_use]
    pub fn path_params(&self) -> Vec<&str> {
        placeholders(&self.path).collect()
    }
}

/// Iterate the `{name}` placeholders of a path template.
pub(crate) fn placeholders(template: &str) -> impl Iterator<Item = &str> {
    let mut rest = template;
    std::iter::from_fn(move || {
        let open = rest.find('{')?;
        let after = &rest[open + 1..];
        let close = after.find('}')?;
        let name = &after[..close];
        rest = &after[close + 1..];
        Some(name)
    })
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub kind: ParamKind,
    #[serde(default)]
    pub required: bool,
}

/// Declared parameter type. Unknown type names fall back to `string`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    #[serde(alias = "integer")]
    Number,
    Object,
    #[default]
    #[serde(other)]
    String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Methods whose arguments travel in a JSON body rather than the query string.
    #[must_use]
    pub fn sends_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }

    #[must_use]
    pub fn as_reqwest(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Post => Method::POST,
            Self::Put => Method::PUT,
            Self::Patch => Method::PATCH,
            Self::Delete => Method::DELETE,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    endpoints: Vec<EndpointDescriptor>,
}

/// Immutable, shareable list of endpoint descriptors.
#[derive(Debug, Clone)]
pub struct EndpointCatalog {
    endpoints: Arc<Vec<EndpointDescriptor>>,
}

impl EndpointCatalog {
    #[must_use]
    pub fn new(endpoints: Vec<EndpointDescriptor>) -> Self {
        Self {
            endpoints: Arc::new(endpoints),
        }
    }

    /// Catalog used when no endpoint file is available.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(vec![EndpointDescriptor {
            path: "/catalogs".to_string(),
            description: "Get a list of available catalogs".to_string(),
            method: HttpMethod::Get,
            params: Vec::new(),
            default_body: None,
            tool_name: None,
        }])
    }

    /// Load the catalog from `path`, falling back to [`EndpointCatalog::builtin`] when no path is
    /// given or the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`OcapiToolsError::Config`] if the file exists but can't be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            tracing::info!("no endpoint catalog configured; using built-in endpoints");
            return Ok(Self::builtin());
        };

        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    path = %path.display(),
                    "endpoint catalog not found; using built-in endpoints"
                );
                return Ok(Self::builtin());
            }
            Err(e) => {
                return Err(OcapiToolsError::Config(format!(
                    "failed to read endpoint catalog '{}': {e}",
                    path.display()
                )));
            }
        };

        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
        let parsed: CatalogFile = if is_yaml {
            serde_yaml::from_str(&text).map_err(|e| {
                OcapiToolsError::Config(format!(
                    "failed to parse endpoint catalog '{}': {e}",
                    path.display()
                ))
            })?
        } else {
            serde_json::from_str(&text).map_err(|e| {
                OcapiToolsError::Config(format!(
                    "failed to parse endpoint catalog '{}': {e}",
                    path.display()
                ))
            })?
        };

        tracing::info!(
            path = %path.display(),
            endpoints = parsed.endpoints.len(),
            "loaded endpoint catalog"
        );
        Ok(Self::new(parsed.endpoints))
    }

    #[must_use]
    pub fn endpoints(&self) -> &[EndpointDescriptor] {
        &self.endpoints
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&EndpointDescriptor> {
        self.endpoints.iter().find(|e| e.path == path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn parses_descriptor_defaults_and_types() {
        let json = r#"{
            "endpoints": [
                {
                    "path": "/sites/{site_id}/campaign_search",
                    "description": "Search campaigns",
                    "method": "POST",
                    "toolName": "campaign_search",
                    "params": [
                        {"name": "site_id", "description": "Site", "type": "string", "required": true},
                        {"name": "count", "description": "Page size", "type": "integer", "required": false},
                        {"name": "body", "description": "Raw body", "type": "object", "required": false},
                        {"name": "when", "description": "Date", "type": "date", "required": false}
                    ]
                },
                { "path": "/catalogs" }
            ]
        }"#;
        let file: CatalogFile = serde_json::from_str(json).expect("parse");
        let search = &file.endpoints[0];
        assert_eq!(search.method, HttpMethod::Post);
        assert_eq!(search.tool_name.as_deref(), Some("campaign_search"));
        let kinds: Vec<ParamKind> = search.params.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ParamKind::String,
                ParamKind::Number,
                ParamKind::Object,
                ParamKind::String
            ]
        );
        assert_eq!(search.path_params(), vec!["site_id"]);

        let plain = &file.endpoints[1];
        assert_eq!(plain.method, HttpMethod::Get);
        assert!(plain.params.is_empty());
        assert!(plain.default_body.is_none());
    }

    #[test]
    fn placeholders_in_order() {
        let names: Vec<&str> =
            placeholders("/catalogs/{catalog_id}/categories/{category_id}/products").collect();
        assert_eq!(names, vec!["catalog_id", "category_id"]);
        assert_eq!(placeholders("/catalogs").count(), 0);
        assert_eq!(placeholders("/broken/{open").count(), 0);
    }

    #[test]
    fn load_falls_back_to_builtin_when_missing() {
        let dir = tempdir().expect("tempdir");
        let catalog = EndpointCatalog::load(Some(&dir.path().join("nope.json"))).expect("load");
        assert_eq!(catalog.len(), 1);
        let only = catalog.get("/catalogs").expect("builtin endpoint");
        assert_eq!(only.description, "Get a list of available catalogs");

        let catalog = EndpointCatalog::load(None).expect("load");
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn load_reads_yaml_and_rejects_garbage() {
        let dir = tempdir().expect("tempdir");
        let yaml = dir.path().join("endpoints.yaml");
        fs::write(
            &yaml,
            "endpoints:\n  - path: /catalog_search\n    method: POST\n    toolName: catalog_search\n",
        )
        .expect("write yaml");
        let catalog = EndpointCatalog::load(Some(&yaml)).expect("load yaml");
        assert_eq!(
            catalog.endpoints()[0].tool_name.as_deref(),
            Some("catalog_search")
        );

        let bad = dir.path().join("endpoints.json");
        fs::write(&bad, "{ not json").expect("write");
        let err = EndpointCatalog::load(Some(&bad)).unwrap_err();
        assert!(matches!(err, OcapiToolsError::Config(_)));
    }
}
