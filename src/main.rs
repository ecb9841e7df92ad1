use anyhow::Result;
use book2epub::{package_book, Book, BookVariant, Crawler, FetchOptions, DEFAULT_AUTHOR_SEPARATOR};
use clap::{Parser, Subcommand};
use colored::*;
use slug::slugify;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "book2epub")]
#[command(about = "CLI utility to turn an online book's table of contents into an EPUB for offline reading")]
#[command(version = "0.1.0")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl a book's table of contents and chapters, then package it
    Crawl {
        /// URL of the book's table of contents
        url: String,

        /// Output EPUB path (defaults to the slugified book title)
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,

        /// Cover image embedded in the package
        #[arg(short = 'c', long = "cover")]
        cover: Option<PathBuf>,

        /// Separator placed between author names
        #[arg(long = "separator", default_value = DEFAULT_AUTHOR_SEPARATOR)]
        separator: String,

        /// Also save the crawled book as JSON
        #[arg(short = 's', long = "snapshot")]
        snapshot: Option<PathBuf>,

        /// Request timeout in seconds
        #[arg(short = 't', long = "timeout", default_value = "30.0", value_parser = parse_timeout)]
        timeout: f64,
    },
    /// Package a previously saved JSON snapshot without touching the network
    Package {
        /// Snapshot written by `crawl --snapshot`
        snapshot: PathBuf,

        /// Output EPUB path (defaults to the slugified book title)
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,

        /// Cover image embedded in the package
        #[arg(short = 'c', long = "cover")]
        cover: Option<PathBuf>,

        /// Separator placed between author names
        #[arg(long = "separator", default_value = DEFAULT_AUTHOR_SEPARATOR)]
        separator: String,
    },
    /// List the books this tool knows how to crawl
    Variants,
}

fn parse_timeout(s: &str) -> Result<f64, String> {
    let value = s.parse::<f64>().map_err(|_| "Not a number.")?;
    if !value.is_finite() || value <= 0.0 {
        return Err("Must be a positive number.".to_string());
    }
    Ok(value)
}

fn default_output(book: &Book) -> PathBuf {
    let slug = slugify(&book.title);
    if slug.is_empty() {
        PathBuf::from("book.epub")
    } else {
        PathBuf::from(format!("{}.epub", slug))
    }
}

async fn crawl(
    url: &str,
    output: Option<PathBuf>,
    cover: Option<PathBuf>,
    separator: &str,
    snapshot: Option<PathBuf>,
    timeout: f64,
) -> Result<()> {
    let options = FetchOptions {
        timeout: Duration::from_secs_f64(timeout),
        ..Default::default()
    };
    let crawler = Crawler::with_http(&options)?;
    let extraction = crawler.run(url).await?;

    if !extraction.is_clean() {
        warn!(
            "{}",
            format!("{} problems during the crawl, affected fields are empty", extraction.issues.len()).yellow()
        );
    }

    if let Some(path) = snapshot {
        extraction.book.save_snapshot(&path).await?;
        info!("Snapshot saved to: {}", path.display().to_string().blue());
    }

    package(&extraction.book, output, cover.as_deref(), separator).await
}

async fn package(book: &Book, output: Option<PathBuf>, cover: Option<&Path>, separator: &str) -> Result<()> {
    let output = output.unwrap_or_else(|| default_output(book));
    info!("Packaging \"{}\" into {}", book.title.green(), output.display());
    package_book(book, &output, cover, separator).await
}

fn list_variants() {
    for variant in BookVariant::KNOWN {
        let authors = variant.authors().join(DEFAULT_AUTHOR_SEPARATOR);
        println!(
            "{}  {}  ({})",
            variant.name().green(),
            variant.source_url().unwrap_or_default(),
            authors
        );
    }
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::from_default_env()
        .add_directive("book2epub=info".parse().expect("static directive"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let args = Args::parse();

    let result = match args.command {
        Commands::Crawl { url, output, cover, separator, snapshot, timeout } => {
            crawl(&url, output, cover, &separator, snapshot, timeout).await
        }
        Commands::Package { snapshot, output, cover, separator } => match Book::load_snapshot(&snapshot).await {
            Ok(book) => package(&book, output, cover.as_deref(), &separator).await,
            Err(e) => Err(e),
        },
        Commands::Variants => {
            list_variants();
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("{}", format!("Error: {}", e).red());
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_must_be_finite_and_positive() {
        assert_eq!(parse_timeout("2.5"), Ok(2.5));
        assert!(parse_timeout("0").is_err());
        assert!(parse_timeout("-1").is_err());
        assert!(parse_timeout("NaN").is_err());
        assert!(parse_timeout("inf").is_err());
        assert!(parse_timeout("abc").is_err());
    }
}
