use anyhow::{Context, Result};
use clap::Parser;
use hemnet_crawler::cli::{self, FetchArgs, StorageArgs};
use hemnet_crawler::extractor::ExtractionStatus;
use hemnet_crawler::tui::ScraperTUI;
use hemnet_crawler::{logging, Pipeline};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Hemnet Crawler - sold listings to CSV")]
struct Args {
    #[clap(flatten)]
    storage: StorageArgs,

    #[clap(flatten)]
    fetch: FetchArgs,

    /// Skip downloading pages and only parse what is already in the storage directory
    #[clap(long)]
    skip_fetch: bool,

    /// Download pages but do not parse or export them
    #[clap(long)]
    skip_export: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.storage.debug);

    println!("Hemnet Crawler - Sold Listings");
    println!("==============================");

    let config = args.fetch.apply(args.storage.config());
    let mut pipeline = Pipeline::new(config);
    let mut tui = ScraperTUI::new();
    let stop = cli::stop_on_ctrl_c(&pipeline.config().storage_dir);

    if !args.skip_fetch {
        let urls = pipeline.urls();
        let summary = pipeline
            .fetch_each(&urls, &stop, Some(&mut tui))
            .await
            .context("Downloading pages failed")?;
        if summary.stopped {
            println!("\nStopped, nothing exported.");
            return Ok(());
        }
    } else {
        println!("Skipping download");
    }

    if args.skip_export {
        println!("Skipping parse & export");
        return Ok(());
    }

    let report = pipeline
        .extract_and_export(Some(&mut tui))
        .context("Scraping failed")?;

    println!("\n=== Summary ===");
    match report.scrape.status() {
        ExtractionStatus::NoFiles => println!("No pages to parse yet."),
        ExtractionStatus::NothingParsed => {
            println!("Pages found but no listings parsed; dataset left unchanged.")
        }
        ExtractionStatus::Parsed => {
            println!("Listings exported: {}", report.exported);
            println!("Warnings: {}", report.scrape.warnings.len());
            println!("Saved to: {}", pipeline.config().output_file.display());
        }
    }

    Ok(())
}
