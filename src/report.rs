use thiserror::Error;

use crate::book::Book;

/// A problem met while crawling that does not stop the crawl.
///
/// The affected field is left empty (or zero) and the crawl carries on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Issue {
    #[error("table of contents at {url} could not be fetched: {reason}")]
    TocUnavailable { url: String, reason: String },
    #[error("no element matched \"{selector}\" in {context}")]
    MissingElement { selector: String, context: String },
    #[error("chapter number label \"{label}\" in section {section} is not \"<word> <number>\"")]
    BadChapterNumber { section: u32, label: String },
    #[error("section {section} lists chapter {number} more than once, keeping the last entry")]
    DuplicateChapter { section: u32, number: u32 },
    #[error("chapter href \"{href}\" in section {section} could not be resolved")]
    InvalidHref { section: u32, href: String },
    #[error("{url} is outside the allowed domain {domain}")]
    OffsiteUrl { url: String, domain: String },
    #[error("chapter at {url} could not be fetched: {reason}")]
    ChapterUnavailable { url: String, reason: String },
    #[error("chapter page {url} has no element matching \"{selector}\"")]
    ChapterContentMissing { url: String, selector: String },
}

/// Output of a crawl: the tree plus everything that went wrong along the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub book: Book,
    pub issues: Vec<Issue>,
}

impl Extraction {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}
