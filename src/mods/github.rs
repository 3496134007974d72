//! Manifest fetching from GitHub repositories.
//!
//! The HTTP transport sits behind [`HttpTransport`] so the fetcher can be
//! driven by reqwest in production and by scripted responses in tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::manifest::{MANIFEST_FILE, Manifest, decode_manifest, unwrap_body};
use super::types::{ModAssets, ModError, ModSource};

/// Default request timeout in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 15;

/// Conventional script file.
pub const CONTENT_SCRIPT_FILE: &str = "content.js";

/// Conventional stylesheet file.
pub const STYLESHEET_FILE: &str = "content.css";

/// Conventional settings page markup.
pub const SETTINGS_HTML_FILE: &str = "settings.html";

/// Conventional settings page script.
pub const SETTINGS_JS_FILE: &str = "settings.js";

/// Response returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

impl HttpResponse {
    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs HTTP GET requests.
pub trait HttpTransport: Send + Sync {
    /// Fetches a URL. Non-success statuses are returned, not turned into errors.
    fn get(&self, url: &str) -> Result<HttpResponse, ModError>;
}

/// Blocking reqwest transport with a bounded timeout.
pub struct ReqwestTransport {
    /// HTTP client.
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    /// Creates a transport whose requests give up after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .user_agent("codystools-mod-manager")
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(
                    "[FETCH] Failed to build HTTP client ({}), using defaults without a timeout",
                    e
                );
                reqwest::blocking::Client::new()
            });

        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS))
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str) -> Result<HttpResponse, ModError> {
        debug!("[FETCH] GET {}", url);
        let start = Instant::now();

        let response = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .map_err(|e| transport_error(url, &e))?;

        let status = response.status().as_u16();
        let body = response.text().map_err(|e| transport_error(url, &e))?;
        debug!("[FETCH] {} -> {} in {:?}", url, status, start.elapsed());

        Ok(HttpResponse { status, body })
    }
}

fn transport_error(url: &str, e: &reqwest::Error) -> ModError {
    if e.is_timeout() {
        warn!("[FETCH] Request timed out: {}", url);
        ModError::Timeout(url.to_string())
    } else {
        warn!("[FETCH] HTTP request failed: {}", e);
        ModError::FetchFailed(e.to_string())
    }
}

/// URL layout used to address repository files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManifestLayout {
    /// `raw.githubusercontent.com/{owner}/{repo}/{branch}/{file}`, plain text.
    #[default]
    RawFile,
    /// `api.github.com/repos/{owner}/{repo}/contents/{file}?ref={branch}`, base64 envelope.
    ContentsApi,
}

impl ManifestLayout {
    /// Parses a layout name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "raw" | "rawfile" | "raw_file" => Some(Self::RawFile),
            "contents" | "api" | "contents_api" => Some(Self::ContentsApi),
            _ => None,
        }
    }

    /// Returns the URL of a file in the source repository.
    #[must_use]
    pub fn file_url(&self, source: &ModSource, file: &str) -> String {
        match self {
            Self::RawFile => format!(
                "https://raw.githubusercontent.com/{}/{}/{}/{}",
                source.owner, source.repo, source.branch, file
            ),
            Self::ContentsApi => format!(
                "https://api.github.com/repos/{}/{}/contents/{}?ref={}",
                source.owner, source.repo, file, source.branch
            ),
        }
    }
}

/// Fetches manifests and assets for mod sources.
pub struct ManifestFetcher {
    /// HTTP transport.
    transport: Arc<dyn HttpTransport>,
    /// URL layout.
    layout: ManifestLayout,
}

impl ManifestFetcher {
    /// Creates a fetcher.
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, layout: ManifestLayout) -> Self {
        Self { transport, layout }
    }

    /// Returns the configured layout.
    #[must_use]
    pub fn layout(&self) -> ManifestLayout {
        self.layout
    }

    /// Fetches and validates the manifest of a source.
    pub fn fetch(&self, source: &ModSource) -> Result<Manifest, ModError> {
        info!("[FETCH] Fetching manifest for {}", source);
        let body = self.fetch_file(source, MANIFEST_FILE)?;
        let manifest = decode_manifest(&body)?;
        debug!("[FETCH] {} manifest version {}", source, manifest.version);
        Ok(manifest)
    }

    /// Fetches the manifest and every asset the mod ships.
    ///
    /// Inline manifest content wins; referenced files come next, then the
    /// conventional file names. A missing asset file is logged and skipped.
    pub fn fetch_bundle(&self, source: &ModSource) -> Result<(Manifest, ModAssets), ModError> {
        let manifest = self.fetch(source)?;

        let js = manifest.js.clone().or_else(|| {
            self.first_available(
                source,
                &[manifest.content_script.as_deref(), Some(CONTENT_SCRIPT_FILE)],
            )
        });
        let css = manifest.css.clone().or_else(|| {
            self.first_available(
                source,
                &[manifest.stylesheet.as_deref(), Some(STYLESHEET_FILE)],
            )
        });

        let assets = ModAssets {
            js,
            css,
            settings_html: self.optional_file(source, SETTINGS_HTML_FILE),
            settings_js: self.optional_file(source, SETTINGS_JS_FILE),
        };

        if assets.is_empty() {
            warn!("[FETCH] {} installs without any script or stylesheet", source);
        }

        Ok((manifest, assets))
    }

    fn first_available(&self, source: &ModSource, files: &[Option<&str>]) -> Option<String> {
        let mut tried = Vec::new();
        for file in files.iter().flatten() {
            if tried.contains(file) {
                continue;
            }
            tried.push(*file);
            if let Some(content) = self.optional_file(source, file) {
                return Some(content);
            }
        }
        None
    }

    fn optional_file(&self, source: &ModSource, file: &str) -> Option<String> {
        match self.fetch_file(source, file) {
            Ok(content) => Some(content),
            Err(ModError::ManifestNotFound(_)) => {
                debug!("[FETCH] {} has no {}", source, file);
                None
            }
            Err(e) => {
                warn!("[FETCH] Failed to fetch {} for {}: {}", file, source, e);
                None
            }
        }
    }

    /// Fetches one repository file and returns its text.
    fn fetch_file(&self, source: &ModSource, file: &str) -> Result<String, ModError> {
        let url = self.layout.file_url(source, file);
        let response = self.transport.get(&url)?;

        if response.status == 404 {
            return Err(ModError::ManifestNotFound(url));
        }
        if !response.is_success() {
            warn!("[FETCH] {} responded {}", url, response.status);
            return Err(ModError::FetchFailed(format!(
                "{} responded {}",
                url, response.status
            )));
        }

        unwrap_body(&response.body)
    }
}
