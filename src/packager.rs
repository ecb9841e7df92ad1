use anyhow::{anyhow, Result};
use colored::*;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::book::{Book, Chapter, Section};

const HREF_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

const COVER_PAGE: &str = "cover.xhtml";

/// Anchor-safe name for a title: spaces become underscores, nothing else changes.
pub fn fragment_id(title: &str) -> String {
    title.replace(' ', "_")
}

pub fn section_body(section: &Section) -> String {
    format!(
        "<h1 style='text-align: center;'> {}. {} </h1>",
        section.number,
        escape_xml(&section.title)
    )
}

pub fn chapter_body(chapter: &Chapter) -> String {
    format!(
        "<h1>Chapter {}: {}</h1>{}",
        chapter.number,
        escape_xml(&chapter.title),
        chapter.content
    )
}

/// One XHTML document inside the package.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    title: String,
    /// Name under `OEBPS/xhtml/`, unique within the package.
    file_name: String,
    body: String,
}

#[derive(Debug, Clone)]
struct SectionEntry {
    entry: Entry,
    chapters: Vec<Entry>,
}

#[derive(Debug, Clone)]
struct CoverImage {
    file_name: String,
    media_type: &'static str,
    data: Vec<u8>,
}

/// Collects metadata and XHTML entries, then writes them out as an EPUB 2
/// container.
pub struct EpubPackager {
    title: String,
    author: String,
    description: String,
    identifier: String,
    cover: Option<CoverImage>,
    sections: Vec<SectionEntry>,
    used_names: HashSet<String>,
}

impl EpubPackager {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            author: String::new(),
            description: String::new(),
            identifier: format!("urn:uuid:{}", uuid::Uuid::new_v4()),
            cover: None,
            sections: Vec::new(),
            used_names: HashSet::from([COVER_PAGE.to_string()]),
        }
    }

    pub fn set_author(&mut self, author: &str) {
        self.author = author.to_string();
    }

    pub fn set_description(&mut self, description: &str) {
        self.description = description.to_string();
    }

    /// Embed the image at `path` and use it as the cover page.
    pub async fn set_cover(&mut self, path: &Path) -> Result<()> {
        let data = fs::read(path)
            .await
            .map_err(|e| anyhow!("Failed to read cover image {}: {}", path.display(), e))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("png")
            .to_ascii_lowercase();

        debug!("Loaded cover image with {} bytes from {}", data.len(), path.display());
        self.cover = Some(CoverImage {
            media_type: image_media_type(&extension),
            file_name: format!("cover.{}", extension),
            data,
        });
        Ok(())
    }

    /// Add a top-level entry; returns its file name for use with
    /// [`EpubPackager::add_sub_section`].
    pub fn add_section(&mut self, title: &str, fragment: &str, body: &str) -> String {
        let file_name = self.unique_file_name(fragment, "section");
        self.sections.push(SectionEntry {
            entry: Entry {
                title: title.to_string(),
                file_name: file_name.clone(),
                body: body.to_string(),
            },
            chapters: Vec::new(),
        });
        file_name
    }

    pub fn add_sub_section(
        &mut self,
        parent: &str,
        title: &str,
        fragment: &str,
        body: &str,
    ) -> Result<String> {
        let index = self
            .sections
            .iter()
            .position(|s| s.entry.file_name == parent)
            .ok_or_else(|| anyhow!("No section with file name {}", parent))?;

        let file_name = self.unique_file_name(fragment, "chapter");
        self.sections[index].chapters.push(Entry {
            title: title.to_string(),
            file_name: file_name.clone(),
            body: body.to_string(),
        });
        Ok(file_name)
    }

    /// Entries in reading order.
    fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.sections
            .iter()
            .flat_map(|s| std::iter::once(&s.entry).chain(s.chapters.iter()))
    }

    fn unique_file_name(&mut self, fragment: &str, fallback: &str) -> String {
        let stem = fragment.replace(['/', '\\'], "_");
        let stem = if stem.is_empty() { fallback.to_string() } else { stem };

        let mut candidate = format!("{}.xhtml", stem);
        let mut n = 2;
        while self.used_names.contains(&candidate) {
            candidate = format!("{}_{}.xhtml", stem, n);
            n += 1;
        }
        self.used_names.insert(candidate.clone());
        candidate
    }

    /// Serialize the whole package into memory.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        // mimetype must be the first entry and uncompressed
        zip.start_file("mimetype", stored)?;
        zip.write_all(b"application/epub+zip")?;

        zip.start_file("META-INF/container.xml", deflated)?;
        zip.write_all(CONTAINER_XML.as_bytes())?;

        zip.start_file("OEBPS/content.opf", deflated)?;
        zip.write_all(self.opf().as_bytes())?;

        zip.start_file("OEBPS/toc.ncx", deflated)?;
        zip.write_all(self.ncx().as_bytes())?;

        if let Some(cover) = &self.cover {
            zip.start_file(format!("OEBPS/images/{}", cover.file_name).as_str(), stored)?;
            zip.write_all(&cover.data)?;

            let img = format!(
                "<div style='text-align: center;'><img src=\"../images/{}\" alt=\"Cover\"/></div>",
                cover.file_name
            );
            zip.start_file(format!("OEBPS/xhtml/{}", COVER_PAGE).as_str(), deflated)?;
            zip.write_all(xhtml_document("Cover", &img).as_bytes())?;
        }

        for entry in self.entries() {
            zip.start_file(format!("OEBPS/xhtml/{}", entry.file_name).as_str(), deflated)?;
            zip.write_all(xhtml_document(&entry.title, &entry.body).as_bytes())?;
        }

        Ok(zip.finish()?.into_inner())
    }

    /// Write the package to `output_path`. The only failure in the pipeline
    /// that reaches the caller.
    pub async fn save(&self, output_path: &Path) -> Result<()> {
        let data = self
            .to_bytes()
            .map_err(|e| anyhow!("Failed to assemble EPUB: {}", e))?;

        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| anyhow!("Failed to create directory {}: {}", parent.display(), e))?;
        }

        fs::write(output_path, data)
            .await
            .map_err(|e| anyhow!("Failed to write EPUB to {}: {}", output_path.display(), e))?;

        info!("EPUB saved to: {}", output_path.display().to_string().blue());
        Ok(())
    }

    fn opf(&self) -> String {
        let mut opf = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="BookId">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
"#,
        );
        opf.push_str(&format!("    <dc:title>{}</dc:title>\n", escape_xml(&self.title)));
        opf.push_str(&format!(
            "    <dc:identifier id=\"BookId\">{}</dc:identifier>\n",
            escape_xml(&self.identifier)
        ));
        opf.push_str("    <dc:language>en</dc:language>\n");
        if !self.author.is_empty() {
            opf.push_str(&format!("    <dc:creator>{}</dc:creator>\n", escape_xml(&self.author)));
        }
        if !self.description.is_empty() {
            opf.push_str(&format!(
                "    <dc:description>{}</dc:description>\n",
                escape_xml(&self.description)
            ));
        }
        if self.cover.is_some() {
            opf.push_str("    <meta name=\"cover\" content=\"cover-image\"/>\n");
        }

        opf.push_str("  </metadata>\n  <manifest>\n");
        opf.push_str(
            "    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>\n",
        );
        if let Some(cover) = &self.cover {
            opf.push_str(&format!(
                "    <item id=\"cover-image\" href=\"images/{}\" media-type=\"{}\"/>\n",
                cover.file_name, cover.media_type
            ));
            opf.push_str(&format!(
                "    <item id=\"cover\" href=\"xhtml/{}\" media-type=\"application/xhtml+xml\"/>\n",
                COVER_PAGE
            ));
        }
        for (index, entry) in self.entries().enumerate() {
            opf.push_str(&format!(
                "    <item id=\"xhtml-{}\" href=\"{}\" media-type=\"application/xhtml+xml\"/>\n",
                index + 1,
                href(&entry.file_name)
            ));
        }

        opf.push_str("  </manifest>\n  <spine toc=\"ncx\">\n");
        if self.cover.is_some() {
            opf.push_str("    <itemref idref=\"cover\"/>\n");
        }
        for index in 0..self.entries().count() {
            opf.push_str(&format!("    <itemref idref=\"xhtml-{}\"/>\n", index + 1));
        }
        opf.push_str("  </spine>\n");

        if self.cover.is_some() {
            opf.push_str(&format!(
                "  <guide>\n    <reference type=\"cover\" title=\"Cover\" href=\"xhtml/{}\"/>\n  </guide>\n",
                COVER_PAGE
            ));
        }
        opf.push_str("</package>\n");
        opf
    }

    fn ncx(&self) -> String {
        let depth = if self.sections.iter().any(|s| !s.chapters.is_empty()) { 2 } else { 1 };

        let mut ncx = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE ncx PUBLIC "-//NISO//DTD ncx 2005-1//EN" "http://www.daisy.org/z3986/2005/ncx-2005-1.dtd">
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
"#,
        );
        ncx.push_str(&format!(
            "    <meta name=\"dtb:uid\" content=\"{}\"/>\n",
            escape_xml(&self.identifier)
        ));
        ncx.push_str(&format!("    <meta name=\"dtb:depth\" content=\"{}\"/>\n", depth));
        ncx.push_str("    <meta name=\"dtb:totalPageCount\" content=\"0\"/>\n");
        ncx.push_str("    <meta name=\"dtb:maxPageNumber\" content=\"0\"/>\n  </head>\n");
        ncx.push_str(&format!(
            "  <docTitle>\n    <text>{}</text>\n  </docTitle>\n  <navMap>\n",
            escape_xml(&self.title)
        ));

        let mut play_order = 1;
        for section in &self.sections {
            open_nav_point(&mut ncx, &section.entry, &mut play_order, 2);
            for chapter in &section.chapters {
                open_nav_point(&mut ncx, chapter, &mut play_order, 3);
                ncx.push_str(&format!("{}</navPoint>\n", "  ".repeat(3)));
            }
            ncx.push_str(&format!("{}</navPoint>\n", "  ".repeat(2)));
        }

        ncx.push_str("  </navMap>\n</ncx>\n");
        ncx
    }
}

/// Package `book` as an EPUB at `output_path`.
///
/// Sections and chapters are emitted in ascending numeric order. A cover
/// that cannot be read is skipped with a warning; failing to write the
/// package is returned as an error.
pub async fn package_book(
    book: &Book,
    output_path: &Path,
    cover_path: Option<&Path>,
    author_separator: &str,
) -> Result<()> {
    let mut epub = EpubPackager::new(&book.title);
    epub.set_author(&book.authors_joined(author_separator));
    epub.set_description(&book.description);

    if let Some(path) = cover_path {
        if let Err(e) = epub.set_cover(path).await {
            warn!("Packaging without a cover: {}", e);
        }
    }

    for section in book.summary.sorted_sections() {
        let section_file =
            epub.add_section(&section.title, &fragment_id(&section.title), &section_body(section));
        info!(">> Add section {}: {}", section.number, section.title.green());

        for chapter in section.sorted_chapters() {
            epub.add_sub_section(
                &section_file,
                &chapter.title,
                &fragment_id(&chapter.title),
                &chapter_body(chapter),
            )?;
            info!(">>>> Add chapter {}: {}", chapter.number, chapter.title);
        }
    }

    epub.save(output_path).await
}

fn open_nav_point(ncx: &mut String, entry: &Entry, play_order: &mut usize, indent: usize) {
    let pad = "  ".repeat(indent);
    ncx.push_str(&format!(
        "{}<navPoint id=\"navpoint-{}\" playOrder=\"{}\">\n",
        pad, play_order, play_order
    ));
    ncx.push_str(&format!(
        "{}  <navLabel>\n{}    <text>{}</text>\n{}  </navLabel>\n",
        pad,
        pad,
        escape_xml(&entry.title),
        pad
    ));
    ncx.push_str(&format!("{}  <content src=\"{}\"/>\n", pad, href(&entry.file_name)));
    *play_order += 1;
}

fn xhtml_document(title: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.1//EN" "http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd">
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
<title>{}</title>
</head>
<body>{}</body>
</html>
"#,
        escape_xml(title),
        body
    )
}

/// Manifest/NCX reference to a file under `OEBPS/xhtml/`.
fn href(file_name: &str) -> String {
    format!("xhtml/{}", utf8_percent_encode(file_name, HREF_SEGMENT))
}

fn image_media_type(extension: &str) -> &'static str {
    match extension {
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        _ => "image/png",
    }
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn book() -> Book {
        let mut book = Book {
            title: "Getting Real".into(),
            authors: vec!["Basecamp".into(), "37Signals".into()],
            description: "Smarter & faster".into(),
            ..Default::default()
        };
        for n in [3, 1, 2] {
            let mut section = Section::new(n, format!("Part {}", n));
            for c in [20 + n, 10 + n] {
                section.chapters.insert(
                    c,
                    Chapter {
                        number: c,
                        title: format!("Chapter {}", c),
                        content: format!("<p>{}</p>", c),
                        url: String::new(),
                    },
                );
            }
            book.summary.sections.insert(n, section);
        }
        book
    }

    fn read_entry(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut out = String::new();
        file.read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn fragment_ids_replace_spaces() {
        assert_eq!(fragment_id("Chapter One"), "Chapter_One");
        assert_eq!(fragment_id("Introduction"), "Introduction");
        assert_eq!(fragment_id("a  b"), "a__b");
    }

    #[test]
    fn bodies_carry_numbers_and_titles() {
        let chapter = Chapter {
            number: 1,
            title: "Chapter 1".into(),
            content: "<p>Hello</p>".into(),
            url: String::new(),
        };
        assert_eq!(chapter_body(&chapter), "<h1>Chapter 1: Chapter 1</h1><p>Hello</p>");
        assert_eq!(
            section_body(&Section::new(2, "Q & A".into())),
            "<h1 style='text-align: center;'> 2. Q &amp; A </h1>"
        );
    }

    #[test]
    fn duplicate_fragments_get_suffixes() {
        let mut epub = EpubPackager::new("t");
        let a = epub.add_section("Intro", "Intro", "");
        let b = epub.add_section("Intro", "Intro", "");
        let c = epub.add_sub_section(&a, "", "", "").unwrap();
        let d = epub.add_sub_section(&a, "x/y", "x/y", "").unwrap();
        assert_eq!((a.as_str(), b.as_str()), ("Intro.xhtml", "Intro_2.xhtml"));
        assert_eq!(c, "chapter.xhtml");
        assert_eq!(d, "x_y.xhtml");
        assert!(epub.add_sub_section("missing.xhtml", "t", "t", "").is_err());
    }

    #[tokio::test]
    async fn entries_follow_numeric_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.epub");
        package_book(&book(), &path, None, ", ").await.unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let opf = read_entry(&bytes, "OEBPS/content.opf");
        assert!(opf.contains("<dc:creator>Basecamp, 37Signals</dc:creator>"));
        assert!(opf.contains("<dc:description>Smarter &amp; faster</dc:description>"));

        let ncx = read_entry(&bytes, "OEBPS/toc.ncx");
        let order = [
            "Part 1", "Chapter 11", "Chapter 21", "Part 2", "Chapter 12", "Chapter 22", "Part 3",
            "Chapter 13", "Chapter 23",
        ];
        let positions: Vec<usize> = order
            .iter()
            .map(|t| ncx.find(&format!("<text>{}</text>", t)).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));

        let chapter = read_entry(&bytes, "OEBPS/xhtml/Chapter_12.xhtml");
        assert!(chapter.contains("<body><h1>Chapter 12: Chapter 12</h1><p>12</p></body>"));
    }

    #[test]
    fn mimetype_comes_first() {
        let bytes = EpubPackager::new("t").to_bytes().unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut first = archive.by_index(0).unwrap();
        assert_eq!(first.name(), "mimetype");
        let mut out = String::new();
        first.read_to_string(&mut out).unwrap();
        assert_eq!(out, "application/epub+zip");
    }

    #[tokio::test]
    async fn embeds_cover() {
        let dir = tempfile::tempdir().unwrap();
        let cover = dir.path().join("Cover.PNG");
        std::fs::write(&cover, b"\x89PNG fake").unwrap();
        let path = dir.path().join("book.epub");

        package_book(&book(), &path, Some(&cover), ", ").await.unwrap();
        let bytes = std::fs::read(&path).unwrap();

        let opf = read_entry(&bytes, "OEBPS/content.opf");
        assert!(opf.contains("<meta name=\"cover\" content=\"cover-image\"/>"));
        assert!(opf.contains("href=\"images/cover.png\" media-type=\"image/png\""));
        assert!(read_entry(&bytes, "OEBPS/xhtml/cover.xhtml").contains("../images/cover.png"));
    }

    #[tokio::test]
    async fn missing_cover_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.epub");
        package_book(&book(), &path, Some(&dir.path().join("nope.png")), ", ")
            .await
            .unwrap();
        let opf = read_entry(&std::fs::read(&path).unwrap(), "OEBPS/content.opf");
        assert!(!opf.contains("cover-image"));
    }

    #[tokio::test]
    async fn write_failure_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be overwritten by a file
        let err = package_book(&book(), dir.path(), None, ", ").await.unwrap_err();
        assert!(err.to_string().contains("Failed to write EPUB"));
    }
}
