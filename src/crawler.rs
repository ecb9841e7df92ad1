use anyhow::Result;
use colored::*;
use tracing::{info, warn};

use crate::book::Book;
use crate::builder::build_book;
use crate::extractor::extract_book_from_html;
use crate::fetcher::{fetch_chapter, FetchOptions, HttpSource, PageSource};
use crate::report::{Extraction, Issue};
use crate::variant::{BookVariant, SiteProfile};

/// Drives one crawl: table of contents first, then every chapter, one
/// request at a time.
pub struct Crawler<S: PageSource> {
    source: S,
}

impl Crawler<HttpSource> {
    pub fn with_http(options: &FetchOptions) -> Result<Self> {
        Ok(Self::new(HttpSource::new(options)?))
    }
}

impl<S: PageSource> Crawler<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Crawl the book published at `target_url`.
    ///
    /// Only a broken variant configuration is an error. Network and markup
    /// problems end up in [`Extraction::issues`].
    pub async fn run(&self, target_url: &str) -> Result<Extraction> {
        let variant = BookVariant::from_url(target_url);

        let Some(profile) = variant.profile()? else {
            warn!("No crawler known for \"{}\", producing an empty book", target_url.yellow());
            return Ok(Extraction {
                book: build_book(variant, Book::default()),
                issues: Vec::new(),
            });
        };

        info!("Crawling {} ({})", variant.name().green(), profile.toc_url);
        let mut extraction = self.crawl(&profile).await;
        extraction.book = build_book(variant, extraction.book);

        info!(
            "Crawl finished: {} sections, {} chapters, {} issues",
            extraction.book.summary.sections.len(),
            extraction.book.chapter_count(),
            extraction.issues.len()
        );
        Ok(extraction)
    }

    /// Extract the table of contents at `profile.toc_url` and fill in every
    /// chapter's content, sections and chapters in ascending order.
    async fn crawl(&self, profile: &SiteProfile) -> Extraction {
        info!("Visiting \"{}\"", profile.toc_url.as_str().green());

        let page = match self.source.fetch(&profile.toc_url).await {
            Ok(page) if profile.allows(&page.url) => page,
            Ok(page) => {
                return Self::toc_failure(Issue::OffsiteUrl {
                    url: page.url.to_string(),
                    domain: profile.allowed_domain.clone(),
                })
            }
            Err(e) => {
                return Self::toc_failure(Issue::TocUnavailable {
                    url: profile.toc_url.to_string(),
                    reason: e.to_string(),
                })
            }
        };
        let mut extraction = extract_book_from_html(&page.body, profile);

        let Extraction { book, issues } = &mut extraction;

        let mut section_numbers: Vec<u32> = book.summary.sections.keys().copied().collect();
        section_numbers.sort_unstable();

        for section_number in section_numbers {
            let Some(section) = book.summary.sections.get_mut(&section_number) else {
                continue;
            };

            let mut chapter_numbers: Vec<u32> = section.chapters.keys().copied().collect();
            chapter_numbers.sort_unstable();

            for chapter_number in chapter_numbers {
                if let Some(chapter) = section.chapters.get_mut(&chapter_number) {
                    fetch_chapter(&self.source, chapter, profile, issues).await;
                    info!("Built chapter {}: {}", chapter.number, chapter.title.blue());
                }
            }
        }

        extraction
    }

    fn toc_failure(issue: Issue) -> Extraction {
        warn!("{}", issue);
        Extraction {
            book: Book::default(),
            issues: vec![issue],
        }
    }
}
