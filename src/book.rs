use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;
use tracing::info;

pub const DEFAULT_AUTHOR_SEPARATOR: &str = ", ";

/// A crawled book: metadata plus the section/chapter tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub title: String,
    pub authors: Vec<String>,
    pub description: String,
    pub summary: Summary,
}

/// Sections keyed by their sequential number. Iterate with
/// [`Summary::sorted_sections`], map order is meaningless.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub sections: HashMap<u32, Section>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub number: u32,
    pub title: String,
    pub chapters: HashMap<u32, Chapter>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub number: u32,
    pub title: String,
    pub content: String,
    pub url: String,
}

impl Book {
    pub fn authors_joined(&self, separator: &str) -> String {
        self.authors.join(separator)
    }

    pub fn chapter_count(&self) -> usize {
        self.summary.sections.values().map(|s| s.chapters.len()).sum()
    }

    /// Load a book previously written with [`Book::save_snapshot`].
    pub async fn load_snapshot(path: &Path) -> Result<Self> {
        let data = fs::read(path)
            .await
            .map_err(|e| anyhow!("Failed to read snapshot {}: {}", path.display(), e))?;

        let book: Book = serde_json::from_slice(&data)
            .map_err(|e| anyhow!("Failed to parse snapshot {}: {}", path.display(), e))?;

        info!(
            "Loaded snapshot with {} sections and {} chapters from {}",
            book.summary.sections.len(),
            book.chapter_count(),
            path.display()
        );
        Ok(book)
    }

    pub async fn save_snapshot(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize book: {}", e))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| anyhow!("Failed to create directory {}: {}", parent.display(), e))?;
        }

        fs::write(path, data)
            .await
            .map_err(|e| anyhow!("Failed to write snapshot to {}: {}", path.display(), e))?;

        Ok(())
    }
}

impl Summary {
    pub fn sorted_sections(&self) -> Vec<&Section> {
        let mut sections: Vec<&Section> = self.sections.values().collect();
        sections.sort_by_key(|s| s.number);
        sections
    }
}

impl Section {
    pub fn new(number: u32, title: String) -> Self {
        Self {
            number,
            title,
            chapters: HashMap::new(),
        }
    }

    pub fn sorted_chapters(&self) -> Vec<&Chapter> {
        let mut chapters: Vec<&Chapter> = self.chapters.values().collect();
        chapters.sort_by_key(|c| c.number);
        chapters
    }
}
