use anyhow::{anyhow, Result};
use scraper::Selector;
use std::collections::BTreeMap;
use std::fmt;

/// Semantic names for the places in a page's markup the crawler cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SelectorKey {
    MainContent,
    BookTitle,
    BookDescription,
    Section,
    SectionTitle,
    ChapterItem,
    ChapterNumber,
    ChapterAnchor,
    RemoveNav,
    RemoveFooter,
}

impl SelectorKey {
    pub const ALL: [SelectorKey; 10] = [
        SelectorKey::MainContent,
        SelectorKey::BookTitle,
        SelectorKey::BookDescription,
        SelectorKey::Section,
        SelectorKey::SectionTitle,
        SelectorKey::ChapterItem,
        SelectorKey::ChapterNumber,
        SelectorKey::ChapterAnchor,
        SelectorKey::RemoveNav,
        SelectorKey::RemoveFooter,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SelectorKey::MainContent => "main_content",
            SelectorKey::BookTitle => "book_title",
            SelectorKey::BookDescription => "book_description",
            SelectorKey::Section => "section",
            SelectorKey::SectionTitle => "section_title",
            SelectorKey::ChapterItem => "chapter_item",
            SelectorKey::ChapterNumber => "chapter_number",
            SelectorKey::ChapterAnchor => "chapter_anchor",
            SelectorKey::RemoveNav => "remove_nav",
            SelectorKey::RemoveFooter => "remove_footer",
        }
    }
}

impl fmt::Display for SelectorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable mapping from [`SelectorKey`] to a compiled CSS selector.
///
/// Built once per crawl and handed by reference to the extractor and the
/// chapter fetcher. Every key must be present, so lookups never fail.
#[derive(Debug, Clone)]
pub struct SelectorTable {
    entries: BTreeMap<SelectorKey, (String, Selector)>,
}

impl SelectorTable {
    /// Compile a table from `(key, expression)` pairs.
    pub fn new<'a, I>(expressions: I) -> Result<Self>
    where
        I: IntoIterator<Item = (SelectorKey, &'a str)>,
    {
        let mut entries = BTreeMap::new();
        for (key, expression) in expressions {
            let selector = Selector::parse(expression)
                .map_err(|e| anyhow!("Invalid selector for {}: \"{}\": {}", key, expression, e))?;
            entries.insert(key, (expression.to_string(), selector));
        }

        if let Some(missing) = SelectorKey::ALL.iter().find(|k| !entries.contains_key(*k)) {
            return Err(anyhow!("Selector table is missing an entry for {}", missing));
        }

        Ok(Self { entries })
    }

    pub fn get(&self, key: SelectorKey) -> &Selector {
        // `new` rejects incomplete tables
        &self.entries[&key].1
    }

    pub fn expression(&self, key: SelectorKey) -> &str {
        &self.entries[&key].0
    }
}
