use anyhow::{Context, Result};
use clap::Parser;
use hemnet_crawler::cli::{self, StorageArgs};
use hemnet_crawler::tui::ScraperTUI;
use hemnet_crawler::{load_dataset, logging, Pipeline};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Parse downloaded Hemnet pages and export them to CSV")]
struct Args {
    #[clap(flatten)]
    storage: StorageArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.storage.debug);

    let mut pipeline = Pipeline::new(args.storage.config());
    cli::exit_on_ctrl_c(&pipeline.config().storage_dir);
    let mut tui = ScraperTUI::new();

    let report = pipeline
        .extract_and_export(Some(&mut tui))
        .context("Scraping failed")?;

    if report.exported > 0 {
        let output = &pipeline.config().output_file;
        let rows = load_dataset(output)
            .with_context(|| format!("Failed to read back {}", output.display()))?;
        println!("Total listings in {}: {}", output.display(), rows.len());
    }

    Ok(())
}
