use std::io::Write;

use owo_colors::OwoColorize;
use pdfextract_core::FileResult;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Totals over one batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Totals {
    pub files: usize,
    pub file_errors: usize,
    pub pages: usize,
    pub page_errors: usize,
    pub warnings: usize,
}

impl Totals {
    pub fn from_files(files: &[FileResult]) -> Self {
        files.iter().fold(Self::default(), |mut t, f| {
            t.files += 1;
            t.file_errors += usize::from(f.error.is_some());
            t.pages += f.pages.len();
            t.page_errors += f.page_errors();
            t.warnings += f.page_warnings();
            t
        })
    }
}

/// One line per file with problems, then the batch totals.
pub fn print_summary(
    w: &mut dyn Write,
    files: &[FileResult],
    color: ColorMode,
) -> std::io::Result<()> {
    for file in files {
        if let Some(error) = &file.error {
            if color.enabled() {
                writeln!(w, "{} {}: {}", "FAILED".red().bold(), file.filename, error)?;
            } else {
                writeln!(w, "FAILED {}: {}", file.filename, error)?;
            }
            continue;
        }
        for page in &file.pages {
            if let Some(error) = &page.error {
                if color.enabled() {
                    writeln!(
                        w,
                        "{} {}, page {}: {}",
                        "ERROR".red(),
                        file.filename,
                        page.page_number,
                        error
                    )?;
                } else {
                    writeln!(w, "ERROR {}, page {}: {}", file.filename, page.page_number, error)?;
                }
            } else if let Some(warning) = &page.warning {
                if color.enabled() {
                    writeln!(
                        w,
                        "{} {}, page {}: {}",
                        "WARNING".yellow(),
                        file.filename,
                        page.page_number,
                        warning
                    )?;
                } else {
                    writeln!(
                        w,
                        "WARNING {}, page {}: {}",
                        file.filename, page.page_number, warning
                    )?;
                }
            }
        }
    }

    let t = Totals::from_files(files);
    writeln!(w)?;
    if color.enabled() {
        writeln!(w, "{}", "Summary".bold())?;
        writeln!(w, "  Files:       {}", t.files.to_string().bold())?;
        writeln!(w, "  Pages:       {}", t.pages.to_string().green())?;
        writeln!(w, "  Page errors: {}", paint_count(t.page_errors, color))?;
        writeln!(w, "  Warnings:    {}", t.warnings.to_string().yellow())?;
        writeln!(w, "  File errors: {}", paint_count(t.file_errors, color))?;
    } else {
        writeln!(w, "Summary")?;
        writeln!(w, "  Files:       {}", t.files)?;
        writeln!(w, "  Pages:       {}", t.pages)?;
        writeln!(w, "  Page errors: {}", t.page_errors)?;
        writeln!(w, "  Warnings:    {}", t.warnings)?;
        writeln!(w, "  File errors: {}", t.file_errors)?;
    }
    Ok(())
}

fn paint_count(n: usize, color: ColorMode) -> String {
    if color.enabled() && n > 0 {
        n.to_string().red().to_string()
    } else {
        n.to_string()
    }
}

/// Print the resources a pattern matches, then the match count line.
pub fn print_matches(
    w: &mut dyn Write,
    names: &[String],
    description: &str,
    color: ColorMode,
) -> std::io::Result<()> {
    for name in names {
        writeln!(w, "  {name}")?;
    }
    if color.enabled() {
        writeln!(w, "{}", description.bold())
    } else {
        writeln!(w, "{description}")
    }
}
