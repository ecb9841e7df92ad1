use colored::*;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use crate::book::{Chapter, Section};
use crate::report::{Extraction, Issue};
use crate::selectors::SelectorKey;
use crate::variant::SiteProfile;

/// Read the table of contents into a book skeleton.
///
/// Sections are numbered 1.. in document order. Chapters come back with
/// their title, number and absolute URL but no content; fetching bodies is
/// the chapter fetcher's job. Nothing here aborts: problems land in
/// [`Extraction::issues`] and the affected fields stay empty.
pub fn extract_book(document: &Html, profile: &SiteProfile) -> Extraction {
    let selectors = &profile.selectors;
    let mut extraction = Extraction::default();

    let Some(root) = document.select(selectors.get(SelectorKey::MainContent)).next() else {
        let issue = Issue::MissingElement {
            selector: selectors.expression(SelectorKey::MainContent).to_string(),
            context: "table of contents".to_string(),
        };
        warn!("{}", issue);
        extraction.issues.push(issue);
        return extraction;
    };

    extraction.book.title = child_text(root, selectors.get(SelectorKey::BookTitle));
    extraction.book.description = child_text(root, selectors.get(SelectorKey::BookDescription));
    debug!("Title: {:?}, description: {:?}", extraction.book.title, extraction.book.description);

    for (index, element) in root.select(selectors.get(SelectorKey::Section)).enumerate() {
        let number = index as u32 + 1;
        let title = child_text(element, selectors.get(SelectorKey::SectionTitle));
        info!("Building section {}: {}", number, title.green());

        let mut section = Section::new(number, title);
        extract_chapters(element, &mut section, profile, &mut extraction.issues);
        extraction.book.summary.sections.insert(number, section);
    }

    extraction
}

/// Convenience wrapper over [`extract_book`] for raw markup.
pub fn extract_book_from_html(html: &str, profile: &SiteProfile) -> Extraction {
    extract_book(&Html::parse_document(html), profile)
}

fn extract_chapters(
    element: ElementRef<'_>,
    section: &mut Section,
    profile: &SiteProfile,
    issues: &mut Vec<Issue>,
) {
    let selectors = &profile.selectors;
    let anchor_selector = selectors.get(SelectorKey::ChapterAnchor);

    for item in element.select(selectors.get(SelectorKey::ChapterItem)) {
        let title = child_text(item, anchor_selector);
        let label = child_text(item, selectors.get(SelectorKey::ChapterNumber));

        let number = match chapter_number(&label) {
            Some(n) => n,
            None => {
                let issue = Issue::BadChapterNumber {
                    section: section.number,
                    label: label.clone(),
                };
                warn!("{}", issue);
                issues.push(issue);
                0
            }
        };

        let href = item
            .select(anchor_selector)
            .next()
            .and_then(|a| a.value().attr("href"))
            .unwrap_or_default();

        let url = match (href.is_empty(), profile.base_url.join(href)) {
            (false, Ok(url)) => url.to_string(),
            _ => {
                let issue = Issue::InvalidHref {
                    section: section.number,
                    href: href.to_string(),
                };
                warn!("{}", issue);
                issues.push(issue);
                String::new()
            }
        };

        debug!("Chapter {}: {} -> {}", number, title, url);

        let chapter = Chapter {
            number,
            title,
            content: String::new(),
            url,
        };
        if section.chapters.insert(number, chapter).is_some() {
            let issue = Issue::DuplicateChapter {
                section: section.number,
                number,
            };
            warn!("{}", issue);
            issues.push(issue);
        }
    }
}

/// Text of every element under `element` matching `selector`, concatenated
/// and trimmed. Empty when nothing matches.
pub fn child_text(element: ElementRef<'_>, selector: &Selector) -> String {
    element
        .select(selector)
        .flat_map(|e| e.text())
        .collect::<String>()
        .trim()
        .to_string()
}

/// "Chapter 12" -> 12. The second whitespace-separated token is the number.
pub fn chapter_number(label: &str) -> Option<u32> {
    label.split_whitespace().nth(1)?.parse().ok()
}
