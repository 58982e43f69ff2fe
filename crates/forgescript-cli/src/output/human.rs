//! Human-readable output formatter with colors and styling.

use super::formatter::BundleListing;
use super::formatter::OutputFormatter;
use anyhow::Result;
use console::Term;
use console::style;
use forgescript_core::AliasCommand;
use forgescript_core::ExtractionReport;
use forgescript_core::LoadReport;
use std::path::Path;
use std::path::PathBuf;

pub struct HumanFormatter {
    verbose: bool,
    quiet: bool,
    use_colors: bool,
    term: Term,
}

impl HumanFormatter {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self {
            verbose,
            quiet,
            use_colors: console::colors_enabled(),
            term: Term::stdout(),
        }
    }

    fn format_size(bytes: u64) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        const GB: u64 = MB * 1024;

        if bytes >= GB {
            format!("{:.1} GB", bytes as f64 / GB as f64)
        } else if bytes >= MB {
            format!("{:.1} MB", bytes as f64 / MB as f64)
        } else if bytes >= KB {
            format!("{:.1} KB", bytes as f64 / KB as f64)
        } else {
            format!("{bytes} B")
        }
    }

    fn headline(&self, message: &str) {
        if self.use_colors {
            let _ = self
                .term
                .write_line(&format!("{} {message}", style("✓").green().bold()));
        } else {
            let _ = self.term.write_line(message);
        }
    }
}

impl OutputFormatter for HumanFormatter {
    fn format_listing(&self, listing: &BundleListing) -> Result<()> {
        if !self.quiet {
            let _ = self.term.write_line(&format!("Format: {}", listing.format));
        }
        // Paths are the payload; print them even in quiet mode.
        for path in &listing.paths {
            let _ = self.term.write_line(path);
        }
        Ok(())
    }

    fn format_extraction_result(&self, dir: &Path, report: &ExtractionReport) -> Result<()> {
        if self.quiet {
            return Ok(());
        }

        self.headline(&format!("Extracted bundle to {}", dir.display()));

        let _ = self
            .term
            .write_line(&format!("  Files extracted: {}", report.files_extracted));
        let _ = self
            .term
            .write_line(&format!("  Directories: {}", report.directories_created));
        let _ = self.term.write_line(&format!(
            "  Total size: {}",
            Self::format_size(report.bytes_written)
        ));

        if self.verbose {
            let _ = self
                .term
                .write_line(&format!("  Links skipped: {}", report.entries_skipped));
            let _ = self
                .term
                .write_line(&format!("  Duration: {:?}", report.duration));
            for path in report.path_strings() {
                let _ = self.term.write_line(&format!("    {path}"));
            }
        }

        Ok(())
    }

    fn format_load_report(&self, report: &LoadReport) -> Result<()> {
        if self.quiet {
            return Ok(());
        }

        self.headline(&format!("Extracted bundle to {}", report.dir.display()));
        for alias in &report.aliases {
            let _ = self.term.write_line(&format!("Registered alias {alias}"));
        }
        if self.verbose {
            let _ = self.term.write_line(&format!(
                "  Files extracted: {} ({})",
                report.extraction.files_extracted,
                Self::format_size(report.extraction.bytes_written)
            ));
        }
        Ok(())
    }

    fn format_command(&self, command: &AliasCommand) -> Result<()> {
        if !self.quiet {
            self.headline(&format!("Dispatching to {}", command.name));
            if !command.display_params.is_empty() {
                let _ = self
                    .term
                    .write_line(&format!("  Display: {}", command.display_params));
            }
        }
        let args = serde_json::to_string_pretty(&command.args)?;
        let _ = self.term.write_line(&args);
        Ok(())
    }

    fn format_cleaned(&self, removed: &[PathBuf]) -> Result<()> {
        if self.quiet {
            return Ok(());
        }

        if removed.is_empty() {
            let _ = self.term.write_line("Nothing to clean");
        }
        for dir in removed {
            self.headline(&format!("Removed {}", dir.display()));
        }
        Ok(())
    }

    fn format_error(&self, error: &anyhow::Error) {
        // Always show errors, even in quiet mode
        let term = Term::stderr();
        if self.use_colors {
            let _ = term.write_line(&format!("{} {error:?}", style("ERROR:").red().bold()));
        } else {
            let _ = term.write_line(&format!("ERROR: {error:?}"));
        }
    }

    fn format_warning(&self, message: &str) {
        if self.quiet {
            return;
        }

        let term = Term::stderr();
        if self.use_colors {
            let _ = term.write_line(&format!("{} {message}", style("WARNING:").yellow().bold()));
        } else {
            let _ = term.write_line(&format!("WARNING: {message}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(HumanFormatter::format_size(512), "512 B");
        assert_eq!(HumanFormatter::format_size(2048), "2.0 KB");
        assert_eq!(HumanFormatter::format_size(3 * 1024 * 1024), "3.0 MB");
        assert_eq!(HumanFormatter::format_size(1024 * 1024 * 1024), "1.0 GB");
    }
}
