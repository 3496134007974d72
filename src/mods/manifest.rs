//! Mod manifest decoding.
//!
//! Parses `mod.json` documents. Two response shapes reach this module: the
//! raw file, and a contents-API envelope carrying the file base64-encoded.
//! Both are normalised here into one [`Manifest`]; the envelope never leaves
//! this module.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::pattern::MATCH_ALL;
use super::types::{DEFAULT_CATEGORY, ModError};

/// Manifest file name at the repository root.
pub const MANIFEST_FILE: &str = "mod.json";

/// Browser-style token for "every URL".
const ALL_URLS: &str = "<all_urls>";

/// Validated mod manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Display name.
    pub name: String,
    /// Dotted numeric version.
    pub version: String,
    /// Description.
    pub description: String,
    /// Category.
    pub category: String,
    /// Normalised target sites.
    pub target_sites: Vec<String>,
    /// Inline script.
    pub js: Option<String>,
    /// Inline stylesheet.
    pub css: Option<String>,
    /// Repository file holding the script.
    pub content_script: Option<String>,
    /// Repository file holding the stylesheet.
    pub stylesheet: Option<String>,
}

/// Manifest as written by mod authors.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestDocument {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default, alias = "targetSites")]
    matches: Option<Vec<String>>,
    #[serde(default)]
    match_all: bool,
    #[serde(default)]
    js: Option<String>,
    #[serde(default)]
    css: Option<String>,
    #[serde(default)]
    content_script: Option<String>,
    #[serde(default)]
    stylesheet: Option<String>,
}

/// Shape of a fetched response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyShape {
    /// The file itself.
    Raw,
    /// Contents-API JSON with base64 `content`.
    Base64Envelope,
}

/// Detects the shape of a response body.
#[must_use]
pub fn detect_shape(body: &str) -> BodyShape {
    if !body.trim_start().starts_with('{') {
        return BodyShape::Raw;
    }

    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map))
            if map.get("content").is_some_and(Value::is_string)
                && map.get("encoding").and_then(Value::as_str) == Some("base64") =>
        {
            BodyShape::Base64Envelope
        }
        _ => BodyShape::Raw,
    }
}

/// Returns the file text carried by a response body of either shape.
pub fn unwrap_body(body: &str) -> Result<String, ModError> {
    match detect_shape(body) {
        BodyShape::Raw => Ok(body.to_string()),
        BodyShape::Base64Envelope => {
            let envelope: Value = serde_json::from_str(body)
                .map_err(|e| ModError::InvalidManifest(e.to_string()))?;
            let encoded: String = envelope
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();

            let bytes = BASE64
                .decode(encoded.as_bytes())
                .map_err(|e| ModError::InvalidManifest(format!("bad base64 content: {}", e)))?;
            debug!("[FETCH] Decoded base64 envelope ({} bytes)", bytes.len());

            String::from_utf8(bytes)
                .map_err(|_| ModError::InvalidManifest("content is not UTF-8".to_string()))
        }
    }
}

/// Decodes and validates a manifest response body.
pub fn decode_manifest(body: &str) -> Result<Manifest, ModError> {
    let text = unwrap_body(body)?;
    let document: ManifestDocument = serde_json::from_str(&text)
        .map_err(|e| ModError::InvalidManifest(format!("not a manifest document: {}", e)))?;
    Manifest::from_document(document)
}

impl Manifest {
    fn from_document(doc: ManifestDocument) -> Result<Self, ModError> {
        let mut missing = Vec::new();

        let name = non_empty(doc.name);
        let version = non_empty(doc.version);
        if name.is_none() {
            missing.push("name");
        }
        if version.is_none() {
            missing.push("version");
        }

        let target_sites = if doc.match_all {
            Some(vec![MATCH_ALL.to_string()])
        } else {
            doc.matches.map(normalise_sites)
        };
        if target_sites.is_none() {
            missing.push("matches");
        }

        let js = non_empty(doc.js);
        let css = non_empty(doc.css);
        let content_script = non_empty(doc.content_script);
        let stylesheet = non_empty(doc.stylesheet);
        if js.is_none() && css.is_none() && content_script.is_none() && stylesheet.is_none() {
            missing.push("js/css/contentScript/stylesheet");
        }

        match (name, version, target_sites) {
            (Some(name), Some(version), Some(target_sites)) if missing.is_empty() => Ok(Self {
                name,
                version,
                description: doc.description.unwrap_or_default(),
                category: non_empty(doc.category).unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
                target_sites,
                js,
                css,
                content_script,
                stylesheet,
            }),
            _ => Err(ModError::InvalidManifest(format!(
                "missing {}",
                missing.join(", ")
            ))),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn normalise_sites(sites: Vec<String>) -> Vec<String> {
    sites
        .into_iter()
        .map(|s| {
            let s = s.trim().to_string();
            if s == ALL_URLS { MATCH_ALL.to_string() } else { s }
        })
        .filter(|s| !s.is_empty())
        .collect()
}
