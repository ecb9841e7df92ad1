use anyhow::{anyhow, Result};
use async_trait::async_trait;
use book2epub::{package_book, Book, Crawler, Page, PageSource};
use std::collections::HashMap;
use std::io::Read;
use url::Url;

struct StubSite(HashMap<&'static str, &'static str>);

#[async_trait]
impl PageSource for StubSite {
    async fn fetch(&self, url: &Url) -> Result<Page> {
        let body = self
            .0
            .get(url.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("404 for {}", url))?;
        Ok(Page {
            url: url.clone(),
            body,
        })
    }
}

const TOC: &str = r#"<html><body><main id="main"><div class="content">
<h1 class="landing-title">Getting Real</h1>
<p class="landing-subtitle">A book</p>
<div class="toc__part">
  <h2 class="toc__part-title">Basics</h2>
  <ul>
    <li class="toc__chapter">
      <p class="toc__chapter-number">Chapter 1</p>
      <h3 class="toc__chapter-title"><a href="/c1">Chapter 1</a></h3>
    </li>
  </ul>
</div>
</div></main></body></html>"#;

const CHAPTER: &str = r#"<html><body><main id="main"><div class="content"><p>Hello</p><footer class="footer">(c) Basecamp</footer></div></main></body></html>"#;

fn site() -> StubSite {
    StubSite(HashMap::from([
        ("https://basecamp.com/gettingreal", TOC),
        ("https://basecamp.com/c1", CHAPTER),
    ]))
}

fn read_entry(path: &std::path::Path, name: &str) -> String {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut out = String::new();
    entry.read_to_string(&mut out).unwrap();
    out
}

#[tokio::test]
async fn crawls_and_packages_a_stub_book() {
    let extraction = Crawler::new(site())
        .run("https://basecamp.com/gettingreal")
        .await
        .unwrap();
    assert!(extraction.is_clean(), "{:?}", extraction.issues);

    let book = &extraction.book;
    assert_eq!(book.title, "Getting Real");
    assert_eq!(book.summary.sections.len(), 1);
    let section = &book.summary.sections[&1];
    assert_eq!(section.title, "Basics");
    assert_eq!(section.chapters[&1].title, "Chapter 1");
    assert_eq!(section.chapters[&1].url, "https://basecamp.com/c1");
    assert_eq!(section.chapters[&1].content, "<p>Hello</p>");

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("getting-real.epub");
    package_book(book, &output, None, ", ").await.unwrap();

    let chapter = read_entry(&output, "OEBPS/xhtml/Chapter_1.xhtml");
    assert!(chapter.contains("<body><h1>Chapter 1: Chapter 1</h1><p>Hello</p></body>"));
    assert!(!chapter.contains("footer"));

    let section = read_entry(&output, "OEBPS/xhtml/Basics.xhtml");
    assert!(section.contains("1. Basics"));

    let ncx = read_entry(&output, "OEBPS/toc.ncx");
    let basics = ncx.find("<text>Basics</text>").unwrap();
    let chapter = ncx.find("<text>Chapter 1</text>").unwrap();
    assert!(basics < chapter);

    let opf = read_entry(&output, "OEBPS/content.opf");
    assert!(opf.contains("<dc:creator>Basecamp, 37Signals</dc:creator>"));
    assert!(opf.contains("<dc:description>A book</dc:description>"));
}

#[tokio::test]
async fn snapshot_packages_like_the_crawl() {
    let extraction = Crawler::new(site())
        .run("https://basecamp.com/gettingreal")
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("book.json");
    extraction.book.save_snapshot(&snapshot).await.unwrap();

    let loaded = Book::load_snapshot(&snapshot).await.unwrap();
    assert_eq!(loaded, extraction.book);

    let output = dir.path().join("from-json.epub");
    package_book(&loaded, &output, None, " & ").await.unwrap();
    let opf = read_entry(&output, "OEBPS/content.opf");
    assert!(opf.contains("<dc:creator>Basecamp &amp; 37Signals</dc:creator>"));
}
