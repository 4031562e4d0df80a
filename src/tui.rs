use crossterm::{
    cursor::MoveToPreviousLine,
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::extractor::{ExtractionStatus, ScrapeReport};

/// Line-oriented progress display for the crawler binaries.
pub struct ScraperTUI {
    out: Box<dyn Write + Send>,
    progress_line_printed: bool,
}

impl Default for ScraperTUI {
    fn default() -> Self {
        Self::new()
    }
}

impl ScraperTUI {
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }

    pub fn with_writer(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Box::new(out),
            progress_line_printed: false,
        }
    }

    fn line(&mut self, color: Color, text: String) -> io::Result<()> {
        execute!(
            self.out,
            SetForegroundColor(color),
            Print(format!("{}\n", text)),
            ResetColor
        )
    }

    fn rewrite_progress_line(&mut self, color: Color, text: String) -> io::Result<()> {
        if self.progress_line_printed {
            execute!(
                self.out,
                MoveToPreviousLine(1),
                Clear(ClearType::CurrentLine),
            )?;
        }
        self.line(color, text)?;
        self.progress_line_printed = true;
        Ok(())
    }

    pub fn start_fetching(&mut self, total_pages: usize) -> io::Result<()> {
        self.progress_line_printed = false;
        self.rewrite_progress_line(
            Color::White,
            format!("⏳ Downloading pages (0/{})...", total_pages),
        )
    }

    pub fn update_fetching_progress(&mut self, done: usize, total: usize, url: &str) -> io::Result<()> {
        let spinner = match done % 4 {
            0 => "⠋",
            1 => "⠙",
            2 => "⠹",
            _ => "⠸",
        };
        self.rewrite_progress_line(
            Color::White,
            format!("{} Downloading pages ({}/{}) - {}", spinner, done, total, url),
        )
    }

    pub fn page_failed(&mut self, ordinal: usize, error: &str) -> io::Result<()> {
        self.progress_line_printed = false;
        self.line(Color::Red, format!("✗ Failed on page {}: {}", ordinal, error))
    }

    pub fn finish_fetching(&mut self, saved: usize, stopped: bool) -> io::Result<()> {
        let text = if stopped {
            format!("■ Stopped after saving {} page(s)", saved)
        } else {
            format!("✓ Saved {} page(s)", saved)
        };
        self.rewrite_progress_line(Color::Green, text)?;
        self.progress_line_printed = false;
        Ok(())
    }

    /// Lists the markup files about to be parsed.
    pub fn show_page_files(&mut self, dir: &Path, files: &[PathBuf]) -> io::Result<()> {
        self.line(
            Color::White,
            format!("📁 Found {} HTML file(s) in {}", files.len(), dir.display()),
        )?;
        for file in files {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string());
            self.line(Color::DarkGrey, format!("   {}", name))?;
        }
        Ok(())
    }

    pub fn show_scrape_report(&mut self, report: &ScrapeReport) -> io::Result<()> {
        for warning in &report.warnings {
            self.line(Color::Yellow, format!("⚠ {}", warning))?;
        }

        match report.status() {
            ExtractionStatus::NoFiles => self.line(
                Color::DarkGrey,
                "No HTML files found. Download pages first.".to_string(),
            ),
            ExtractionStatus::NothingParsed => self.line(
                Color::Yellow,
                format!(
                    "⚠ {} file(s) found but no listings could be parsed",
                    report.files.len()
                ),
            ),
            ExtractionStatus::Parsed => self.line(
                Color::White,
                format!(
                    "🔍 Parsed {} listings from {} file(s)",
                    report.records.len(),
                    report.files.len()
                ),
            ),
        }
    }

    pub fn show_export(&mut self, count: usize, output: &Path) -> io::Result<()> {
        self.line(
            Color::Green,
            format!("✅ Exported {} listings to {}", count, output.display()),
        )
    }
}

/// The display is best effort: a failed write is logged and the work goes on.
pub(crate) fn keep_going(result: io::Result<()>) {
    if let Err(e) = result {
        warn!("Could not update progress display: {}", e);
    }
}
