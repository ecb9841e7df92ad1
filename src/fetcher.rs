use anyhow::{anyhow, Result};
use async_trait::async_trait;
use colored::*;
use scraper::{ElementRef, Html};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::book::Chapter;
use crate::report::Issue;
use crate::selectors::{SelectorKey, SelectorTable};
use crate::variant::SiteProfile;
use crate::xhtml::inner_xhtml;

const USER_AGENT: &str = concat!("book2epub/", env!("CARGO_PKG_VERSION"));

/// A fetched document and the URL it was finally served from, which differs
/// from the requested one after redirects.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: Url,
    pub body: String,
}

/// Anything that can hand back the markup behind a URL.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Page>;
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: USER_AGENT.to_string(),
        }
    }
}

/// Plain HTTP GET, one request at a time.
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(options: &FetchOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(options.user_agent.as_str())
            .timeout(options.timeout)
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageSource for HttpSource {
    async fn fetch(&self, url: &Url) -> Result<Page> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| anyhow!("Request to {} failed: {}", url, e))?
            .error_for_status()
            .map_err(|e| anyhow!("Bad response from {}: {}", url, e))?;

        let final_url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read body from {}: {}", url, e))?;

        Ok(Page { url: final_url, body })
    }
}

/// Fetch `chapter.url` and store the cleaned-up main content in
/// `chapter.content`. On any failure the content stays empty and an
/// [`Issue`] is recorded.
pub async fn fetch_chapter(
    source: &dyn PageSource,
    chapter: &mut Chapter,
    profile: &SiteProfile,
    issues: &mut Vec<Issue>,
) {
    // Unresolvable hrefs were already reported by the extractor
    if chapter.url.is_empty() {
        return;
    }

    let issue = match fetch_content(source, &chapter.url, profile).await {
        Ok(content) => {
            debug!("Chapter {} content: {} bytes", chapter.number, content.len());
            chapter.content = content;
            return;
        }
        Err(issue) => issue,
    };

    warn!("{}", issue);
    issues.push(issue);
}

async fn fetch_content(
    source: &dyn PageSource,
    raw_url: &str,
    profile: &SiteProfile,
) -> std::result::Result<String, Issue> {
    let url = Url::parse(raw_url).map_err(|e| Issue::ChapterUnavailable {
        url: raw_url.to_string(),
        reason: e.to_string(),
    })?;

    if !profile.allows(&url) {
        return Err(Issue::OffsiteUrl {
            url: raw_url.to_string(),
            domain: profile.allowed_domain.clone(),
        });
    }

    info!("Visiting chapter \"{}\"", raw_url.green());
    let page = source.fetch(&url).await.map_err(|e| Issue::ChapterUnavailable {
        url: raw_url.to_string(),
        reason: e.to_string(),
    })?;

    // Redirects may have left the allowed domain
    if !profile.allows(&page.url) {
        return Err(Issue::OffsiteUrl {
            url: page.url.to_string(),
            domain: profile.allowed_domain.clone(),
        });
    }

    strip_boilerplate(&page.body, &profile.selectors).ok_or_else(|| Issue::ChapterContentMissing {
        url: raw_url.to_string(),
        selector: profile.selectors.expression(SelectorKey::MainContent).to_string(),
    })
}

/// Locate the main content container, drop every navigation and footer
/// block inside it and return what is left as inner XHTML.
///
/// Returns `None` when the page has no main content container.
pub fn strip_boilerplate(html: &str, selectors: &SelectorTable) -> Option<String> {
    let mut document = Html::parse_document(html);
    let container_id = document
        .select(selectors.get(SelectorKey::MainContent))
        .next()?
        .id();

    let doomed: Vec<_> = {
        let container = ElementRef::wrap(document.tree.get(container_id)?)?;
        [SelectorKey::RemoveNav, SelectorKey::RemoveFooter]
            .into_iter()
            .flat_map(move |key| container.select(selectors.get(key)).map(|e| e.id()))
            .collect()
    };

    debug!("Removing {} boilerplate elements", doomed.len());
    for id in doomed {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }

    let container = ElementRef::wrap(document.tree.get(container_id)?)?;
    Some(inner_xhtml(container))
}
