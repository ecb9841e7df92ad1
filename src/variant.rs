use anyhow::{anyhow, Result};
use url::Url;

use crate::book::Book;
use crate::selectors::{SelectorKey, SelectorTable};

const GETTING_REAL_URL: &str = "https://basecamp.com/gettingreal";

const GETTING_REAL_SELECTORS: [(SelectorKey, &str); 10] = [
    (SelectorKey::MainContent, "main#main > div.content"),
    (SelectorKey::BookTitle, "h1.landing-title"),
    (SelectorKey::BookDescription, "p.landing-subtitle"),
    (SelectorKey::Section, "div.toc__part"),
    (SelectorKey::SectionTitle, "h2.toc__part-title"),
    (SelectorKey::ChapterItem, "li.toc__chapter"),
    (SelectorKey::ChapterNumber, "p.toc__chapter-number"),
    (SelectorKey::ChapterAnchor, "h3.toc__chapter-title > a"),
    (SelectorKey::RemoveNav, "nav.pagination"),
    (SelectorKey::RemoveFooter, "footer.footer"),
];

/// Where and how to crawl one recognized book.
#[derive(Debug, Clone)]
pub struct SiteProfile {
    /// Chapter hrefs are resolved against this.
    pub base_url: Url,
    pub toc_url: Url,
    /// Only URLs on this host are fetched.
    pub allowed_domain: String,
    pub selectors: SelectorTable,
}

impl SiteProfile {
    pub fn allows(&self, url: &Url) -> bool {
        url.host_str() == Some(self.allowed_domain.as_str())
    }
}

/// The books this tool knows how to crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookVariant {
    /// "Getting Real" by Basecamp, published as one page per chapter.
    GettingReal,
    /// Anything unrecognized; crawls nothing and yields an empty book.
    Generic,
}

impl BookVariant {
    pub const KNOWN: [BookVariant; 1] = [BookVariant::GettingReal];

    pub fn from_url(url: &str) -> Self {
        let normalized = url.trim().trim_end_matches('/');
        Self::KNOWN
            .into_iter()
            .find(|v| v.source_url() == Some(normalized))
            .unwrap_or(BookVariant::Generic)
    }

    pub fn name(self) -> &'static str {
        match self {
            BookVariant::GettingReal => "getting-real",
            BookVariant::Generic => "generic",
        }
    }

    pub fn source_url(self) -> Option<&'static str> {
        match self {
            BookVariant::GettingReal => Some(GETTING_REAL_URL),
            BookVariant::Generic => None,
        }
    }

    pub fn authors(self) -> &'static [&'static str] {
        match self {
            BookVariant::GettingReal => &["Basecamp", "37Signals"],
            BookVariant::Generic => &[],
        }
    }

    /// A book carrying only what is known without crawling.
    pub fn seed_book(self) -> Book {
        Book {
            authors: self.authors().iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Crawl settings, or `None` for variants with nothing to crawl.
    pub fn profile(self) -> Result<Option<SiteProfile>> {
        match self {
            BookVariant::GettingReal => {
                let toc_url = Url::parse(GETTING_REAL_URL)
                    .map_err(|e| anyhow!("Invalid table of contents URL: {}", e))?;
                let base_url = toc_url
                    .join("/")
                    .map_err(|e| anyhow!("Invalid base URL: {}", e))?;
                Ok(Some(SiteProfile {
                    base_url,
                    toc_url,
                    allowed_domain: "basecamp.com".to_string(),
                    selectors: SelectorTable::new(GETTING_REAL_SELECTORS)?,
                }))
            }
            BookVariant::Generic => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_getting_real() {
        assert_eq!(BookVariant::from_url("https://basecamp.com/gettingreal"), BookVariant::GettingReal);
        assert_eq!(BookVariant::from_url("https://basecamp.com/gettingreal/"), BookVariant::GettingReal);
        assert_eq!(
            BookVariant::GettingReal.seed_book().authors,
            vec!["Basecamp".to_string(), "37Signals".to_string()]
        );
    }

    #[test]
    fn unknown_url_gets_empty_book() {
        let variant = BookVariant::from_url("https://example.com/some-book");
        assert_eq!(variant, BookVariant::Generic);
        assert_eq!(variant.seed_book(), Book::default());
        assert!(variant.profile().unwrap().is_none());
    }

    #[test]
    fn getting_real_profile_is_complete() {
        let profile = BookVariant::GettingReal.profile().unwrap().unwrap();
        assert_eq!(profile.base_url.as_str(), "https://basecamp.com/");
        assert_eq!(profile.selectors.expression(SelectorKey::Section), "div.toc__part");
        assert!(profile.allows(&Url::parse("https://basecamp.com/gettingreal/01.1").unwrap()));
        assert!(!profile.allows(&Url::parse("https://evil.example/x").unwrap()));
    }
}
