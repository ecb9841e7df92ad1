use crate::book::Book;
use crate::variant::BookVariant;

/// Merge what the variant knows up front (authors) with what was crawled.
///
/// Authors always come from the variant; anything the crawl put in
/// `authors` is ignored. Unrecognized variants yield the default book.
pub fn build_book(variant: BookVariant, crawled: Book) -> Book {
    let mut book = variant.seed_book();
    if variant == BookVariant::Generic {
        return book;
    }

    book.title = crawled.title;
    book.description = crawled.description;
    book.summary = crawled.summary;
    book
}

/// [`build_book`] keyed by the URL the crawl started from.
pub fn book_for_url(source_url: &str, crawled: Book) -> Book {
    build_book(BookVariant::from_url(source_url), crawled)
}
