use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::domain::Doi;
use crate::error::{AcquireError, HarvestError};
use crate::fs_util;
use crate::strategy::{Strategy, StrategyOutcome};

pub const DOI_RESOLVER_BASE: &str = "https://doi.org";

static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("static anchor selector"));

/// Follows the DOI redirect to the publisher landing page and downloads the
/// first link that looks like a PDF.
#[derive(Debug, Clone)]
pub struct DirectResolutionStrategy {
    client: Client,
    resolver_base: String,
}

impl DirectResolutionStrategy {
    pub fn new(resolver_base: &str, user_agent: Option<&str>) -> Result<Self, HarvestError> {
        let agent = user_agent
            .map(str::to_string)
            .unwrap_or_else(|| format!("doi-harvest/{}", env!("CARGO_PKG_VERSION")));
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&agent).map_err(|err| HarvestError::HttpClient(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|err| HarvestError::HttpClient(err.to_string()))?;
        Ok(Self {
            client,
            resolver_base: resolver_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn resolution_url(&self, doi: &Doi) -> String {
        format!("{}/{}", self.resolver_base, doi.as_str().trim())
    }

    fn resolve_landing(&self, doi: &Doi, timeout: Duration) -> Result<(Url, String), AcquireError> {
        let url = self.resolution_url(doi);
        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .map_err(|err| AcquireError::ResolutionError(format!("{url}: {err}")))?;
        let response = handle_status(response).map_err(AcquireError::ResolutionError)?;
        let landing = response.url().clone();
        let html = response
            .text()
            .map_err(|err| AcquireError::ResolutionError(format!("{landing}: {err}")))?;
        debug!(%landing, "resolved DOI landing page");
        Ok((landing, html))
    }

    fn fetch(&self, url: &Url, timeout: Duration) -> Result<Vec<u8>, AcquireError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .map_err(|err| AcquireError::FetchError(format!("{url}: {err}")))?;
        let response = handle_status(response).map_err(AcquireError::FetchError)?;
        let body = response
            .bytes()
            .map_err(|err| AcquireError::FetchError(format!("{url}: {err}")))?;
        Ok(body.to_vec())
    }

    fn try_acquire(
        &self,
        doi: &Doi,
        destination: &Path,
        timeout: Duration,
    ) -> Result<PathBuf, AcquireError> {
        let (landing, html) = self.resolve_landing(doi, timeout)?;
        let href =
            find_pdf_link(&html).ok_or_else(|| AcquireError::LinkNotFound(landing.to_string()))?;
        let pdf_url = absolutize(&href, &landing).ok_or_else(|| {
            AcquireError::FetchError(format!("cannot resolve link {href} against {landing}"))
        })?;
        debug!(%pdf_url, "fetching PDF link");
        let body = self.fetch(&pdf_url, timeout)?;
        fs_util::write_atomic(destination, &body)?;
        Ok(destination.to_path_buf())
    }
}

impl Strategy for DirectResolutionStrategy {
    fn name(&self) -> &'static str {
        "direct-resolution"
    }

    fn acquire(&self, doi: &Doi, destination: &Path, timeout: Duration) -> StrategyOutcome {
        self.try_acquire(doi, destination, timeout).into()
    }
}

fn handle_status(response: Response) -> Result<Response, String> {
    if response.status().is_success() {
        return Ok(response);
    }
    Err(format!("{} returned status {}", response.url(), response.status()))
}

/// First `href` on the page containing `pdf`, compared ASCII case-insensitively.
pub fn find_pdf_link(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&ANCHOR_SELECTOR)
        .filter_map(|anchor| anchor.value().attr("href"))
        .find(|href| href.to_ascii_lowercase().contains("pdf"))
        .map(str::to_string)
}

/// Resolves `href` against the landing page URL; absolute links are returned unchanged.
pub fn absolutize(href: &str, landing: &Url) -> Option<Url> {
    landing.join(href).ok()
}
