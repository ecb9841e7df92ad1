//! # book2epub
//!
//! A CLI utility to turn a book published as a table of contents plus one
//! web page per chapter into an EPUB file.
//!
//! ## Current Features
//!
//! - Table of contents crawling into numbered sections and chapters
//! - Chapter page cleanup (pagination and footer removal)
//! - EPUB packaging with cover image and nested table of contents
//! - JSON snapshots of the crawled book for offline re-packaging
//!
//! ## Usage
//!
//! ```bash
//! book2epub crawl https://basecamp.com/gettingreal --cover cover.png
//! ```

mod book;
mod builder;
mod crawler;
mod extractor;
mod fetcher;
mod packager;
mod report;
mod selectors;
mod variant;
mod xhtml;

pub use book::{Book, Chapter, Section, Summary, DEFAULT_AUTHOR_SEPARATOR};
pub use builder::{book_for_url, build_book};
pub use crawler::Crawler;
pub use fetcher::{FetchOptions, HttpSource, Page, PageSource};
pub use packager::{package_book, EpubPackager};
pub use report::{Extraction, Issue};
pub use variant::{BookVariant, SiteProfile};
