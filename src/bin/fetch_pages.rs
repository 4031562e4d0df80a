use anyhow::{Context, Result};
use clap::Parser;
use hemnet_crawler::cli::{self, FetchArgs, StorageArgs};
use hemnet_crawler::tui::ScraperTUI;
use hemnet_crawler::{logging, Pipeline};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Download Hemnet sold-listing pages")]
struct Args {
    #[clap(flatten)]
    storage: StorageArgs,

    #[clap(flatten)]
    fetch: FetchArgs,

    /// Print the page URLs and exit
    #[clap(long)]
    list_urls: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.storage.debug);

    let config = args.fetch.apply(args.storage.config());
    let mut pipeline = Pipeline::new(config);
    let urls = pipeline.urls();

    if args.list_urls {
        for url in &urls {
            println!("{}", url);
        }
        return Ok(());
    }

    let mut tui = ScraperTUI::new();
    let stop = cli::stop_on_ctrl_c(&pipeline.config().storage_dir);
    let summary = pipeline
        .fetch_each(&urls, &stop, Some(&mut tui))
        .await
        .context("Downloading pages failed")?;

    println!(
        "Saved {} page(s) to {}",
        summary.pages.len(),
        pipeline.store().dir().display()
    );

    Ok(())
}
