//! Text and table extraction for PDF and Markdown documents.
//!
//! Extraction turns one file into an ordered list of [`Segment`]s, each
//! tagged with its page (or section) and whether it is prose or a table.
//! Table regions are rendered as Markdown tables and removed from the
//! prose of the same page so no content is indexed twice.

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use std::path::Path;

use crate::models::ContentKind;

/// Extraction error. The indexing pass logs it and skips the file.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported document type: {0}")]
    UnsupportedType(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// Declared type of a source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Markdown,
}

impl DocumentKind {
    /// Infer the document type from the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "md" | "markdown" => Some(DocumentKind::Markdown),
            _ => None,
        }
    }
}

/// A span of extracted content with its location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub page: u32,
    pub kind: ContentKind,
    pub text: String,
}

/// Extract all segments from a document on disk.
pub fn extract_document(path: &Path, kind: DocumentKind) -> Result<Vec<Segment>, ExtractError> {
    let bytes = std::fs::read(path).map_err(|e| ExtractError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    match kind {
        DocumentKind::Pdf => extract_pdf(&bytes),
        DocumentKind::Markdown => Ok(extract_markdown(&decode_text(&bytes))),
    }
}

/// Extract a file whose type is inferred from its extension.
pub fn extract_path(path: &Path) -> Result<Vec<Segment>, ExtractError> {
    let kind = DocumentKind::from_path(path)
        .ok_or_else(|| ExtractError::UnsupportedType(path.display().to_string()))?;
    extract_document(path, kind)
}

fn extract_pdf(bytes: &[u8]) -> Result<Vec<Segment>, ExtractError> {
    // pdf-extract panics on some malformed inputs instead of returning Err.
    let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| ExtractError::Pdf("parser panicked on malformed input".to_string()))?
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;

    let mut segments = Vec::new();
    for (idx, page_text) in pages.iter().enumerate() {
        segments.extend(split_page(idx as u32 + 1, page_text));
    }
    Ok(segments)
}

/// Split one page of plain text into a prose segment and table segments.
///
/// A table is a run of at least two consecutive lines that each break into
/// the same number (two or more) of cells separated by tabs or runs of two
/// or more spaces.
pub fn split_page(page: u32, text: &str) -> Vec<Segment> {
    let lines: Vec<&str> = text.lines().collect();
    let mut prose: Vec<&str> = Vec::new();
    let mut tables: Vec<Vec<Vec<String>>> = Vec::new();
    let mut run: Vec<(&str, Vec<String>)> = Vec::new();

    for line in lines {
        let cells = split_cells(line);
        if cells.len() >= 2 {
            let same_width = run.last().map_or(true, |(_, prev)| prev.len() == cells.len());
            if !same_width {
                flush_run(&mut run, &mut prose, &mut tables);
            }
            run.push((line, cells));
        } else {
            flush_run(&mut run, &mut prose, &mut tables);
            prose.push(line);
        }
    }
    flush_run(&mut run, &mut prose, &mut tables);

    let mut segments = Vec::new();
    let prose_text = prose.join("\n");
    if !prose_text.trim().is_empty() {
        segments.push(Segment {
            page,
            kind: ContentKind::Text,
            text: prose_text.trim().to_string(),
        });
    }
    for rows in tables {
        let rendered = markdown_table(&rows);
        if !rendered.is_empty() {
            segments.push(Segment {
                page,
                kind: ContentKind::Table,
                text: rendered,
            });
        }
    }
    segments
}

fn flush_run<'a>(
    run: &mut Vec<(&'a str, Vec<String>)>,
    prose: &mut Vec<&'a str>,
    tables: &mut Vec<Vec<Vec<String>>>,
) {
    if run.len() >= 2 {
        tables.push(run.drain(..).map(|(_, cells)| cells).collect());
    } else {
        prose.extend(run.drain(..).map(|(line, _)| line));
    }
}

fn split_cells(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut spaces = 0usize;

    for ch in line.trim().chars() {
        match ch {
            '\t' => {
                push_cell(&mut current, &mut cells);
                spaces = 0;
            }
            ' ' => spaces += 1,
            _ => {
                if spaces >= 2 {
                    push_cell(&mut current, &mut cells);
                } else if spaces == 1 {
                    current.push(' ');
                }
                spaces = 0;
                current.push(ch);
            }
        }
    }
    push_cell(&mut current, &mut cells);
    cells
}

fn push_cell(current: &mut String, cells: &mut Vec<String>) {
    let cell = current.trim();
    if !cell.is_empty() {
        cells.push(cell.to_string());
    }
    current.clear();
}

/// Render rows as a Markdown table: header, alignment row, data rows.
///
/// Data rows whose width differs from the header are dropped.
pub fn markdown_table(rows: &[Vec<String>]) -> String {
    let Some(header) = rows.first() else {
        return String::new();
    };
    if header.is_empty() {
        return String::new();
    }

    let clean = |cell: &String| cell.replace('\n', " ").trim().to_string();
    let header: Vec<String> = header.iter().map(clean).collect();
    let align: Vec<&str> = header.iter().map(|_| ":---").collect();

    let mut lines = vec![
        format!("| {} |", header.join(" | ")),
        format!("| {} |", align.join(" | ")),
    ];
    for row in &rows[1..] {
        if row.len() != header.len() {
            continue;
        }
        let cells: Vec<String> = row.iter().map(clean).collect();
        lines.push(format!("| {} |", cells.join(" | ")));
    }
    lines.join("\n")
}

/// Extract a Markdown document as a single section (page 1).
pub fn extract_markdown(text: &str) -> Vec<Segment> {
    let mut table_ranges: Vec<std::ops::Range<usize>> = Vec::new();
    let mut tables: Vec<String> = Vec::new();
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell = String::new();
    let mut in_table = false;

    let parser = Parser::new_ext(text, Options::ENABLE_TABLES);
    for (event, range) in parser.into_offset_iter() {
        match event {
            Event::Start(Tag::Table(_)) => {
                in_table = true;
                rows.clear();
                table_ranges.push(range);
            }
            Event::End(TagEnd::Table) => {
                in_table = false;
                tables.push(markdown_table(&rows));
            }
            Event::Start(Tag::TableHead) | Event::Start(Tag::TableRow) => row.clear(),
            Event::End(TagEnd::TableHead) | Event::End(TagEnd::TableRow) => {
                rows.push(std::mem::take(&mut row));
            }
            Event::Start(Tag::TableCell) => cell.clear(),
            Event::End(TagEnd::TableCell) => row.push(cell.trim().to_string()),
            Event::Text(t) | Event::Code(t) if in_table => cell.push_str(&t),
            Event::SoftBreak | Event::HardBreak if in_table => cell.push(' '),
            _ => {}
        }
    }

    let mut prose = String::with_capacity(text.len());
    let mut cursor = 0usize;
    for range in &table_ranges {
        if range.start > cursor {
            prose.push_str(&text[cursor..range.start]);
        }
        cursor = cursor.max(range.end);
    }
    if cursor < text.len() {
        prose.push_str(&text[cursor..]);
    }

    let mut segments = Vec::new();
    if !prose.trim().is_empty() {
        segments.push(Segment {
            page: 1,
            kind: ContentKind::Text,
            text: prose.trim().to_string(),
        });
    }
    for table in tables.into_iter().filter(|t| !t.is_empty()) {
        segments.push(Segment {
            page: 1,
            kind: ContentKind::Table,
            text: table,
        });
    }
    segments
}

/// Decode bytes as UTF-8, falling back to Latin-1 for legacy files.
fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_kind_from_extension() {
        assert_eq!(
            DocumentKind::from_path(Path::new("a/Report.PDF")),
            Some(DocumentKind::Pdf)
        );
        assert_eq!(
            DocumentKind::from_path(Path::new("notes.markdown")),
            Some(DocumentKind::Markdown)
        );
        assert_eq!(DocumentKind::from_path(Path::new("notes.txt")), None);
    }

    #[test]
    fn test_unsupported_type_returns_error() {
        let err = extract_path(Path::new("/tmp/whatever.docx")).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedType(_)));
    }

    #[test]
    fn test_invalid_pdf_returns_error() {
        let err = extract_pdf(b"not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn test_split_cells() {
        assert_eq!(split_cells("Name   Age  City"), vec!["Name", "Age", "City"]);
        assert_eq!(split_cells("a\tb"), vec!["a", "b"]);
        assert_eq!(split_cells("just a sentence."), vec!["just a sentence."]);
    }

    #[test]
    fn test_page_tables_excluded_from_prose() {
        let page = "Enrollment rules are listed below.\n\
                    Course    Seats   Shift\n\
                    Physics   40      Morning\n\
                    History   35      Evening\n\
                    Applicants must register online.";
        let segments = split_page(3, page);
        assert_eq!(segments.len(), 2);

        let prose = &segments[0];
        assert_eq!(prose.kind, ContentKind::Text);
        assert_eq!(prose.page, 3);
        assert!(prose.text.contains("Enrollment rules"));
        assert!(prose.text.contains("register online"));
        assert!(!prose.text.contains("Physics"));

        let table = &segments[1];
        assert_eq!(table.kind, ContentKind::Table);
        assert_eq!(
            table.text,
            "| Course | Seats | Shift |\n| :--- | :--- | :--- |\n| Physics | 40 | Morning |\n| History | 35 | Evening |"
        );
    }

    #[test]
    fn test_single_columnar_line_stays_prose() {
        let segments = split_page(1, "Total  42\nNothing else here.");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].kind, ContentKind::Text);
        assert!(segments[0].text.contains("Total"));
    }

    #[test]
    fn test_blank_page_yields_nothing() {
        assert!(split_page(1, "   \n\n").is_empty());
    }

    #[test]
    fn test_markdown_table_drops_ragged_rows() {
        let rows = vec![
            vec!["h1".to_string(), "h2".to_string()],
            vec!["a".to_string(), "b".to_string()],
            vec!["only one".to_string()],
            vec!["multi\nline".to_string(), "c".to_string()],
        ];
        assert_eq!(
            markdown_table(&rows),
            "| h1 | h2 |\n| :--- | :--- |\n| a | b |\n| multi line | c |"
        );
        assert_eq!(markdown_table(&[]), "");
    }

    #[test]
    fn test_markdown_tables_separated() {
        let md = "# Fees\n\nThe fees are shown below.\n\n| Item | Cost |\n|------|------|\n| Book | 10 |\n| Pen | `2` |\n\nPay before Friday.\n";
        let segments = extract_markdown(md);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].kind, ContentKind::Text);
        assert!(segments[0].text.contains("The fees are shown below."));
        assert!(segments[0].text.contains("Pay before Friday."));
        assert!(!segments[0].text.contains("Book"));
        assert_eq!(segments[1].kind, ContentKind::Table);
        assert_eq!(
            segments[1].text,
            "| Item | Cost |\n| :--- | :--- |\n| Book | 10 |\n| Pen | 2 |"
        );
        assert!(segments.iter().all(|s| s.page == 1));
    }

    #[test]
    fn test_markdown_without_tables_single_section() {
        let segments = extract_markdown("Paris is the capital of France.");
        assert_eq!(
            segments,
            vec![Segment {
                page: 1,
                kind: ContentKind::Text,
                text: "Paris is the capital of France.".to_string(),
            }]
        );
    }

    #[test]
    fn test_latin1_fallback() {
        let bytes = b"Cora\xe7\xe3o";
        assert_eq!(decode_text(bytes), "Coração");
        assert_eq!(decode_text("plain".as_bytes()), "plain");
    }

    #[test]
    fn test_extract_document_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.md");
        std::fs::write(&path, "Hello from disk.").unwrap();
        let segments = extract_path(&path).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "Hello from disk.");

        let err = extract_path(&dir.path().join("missing.md")).unwrap_err();
        assert!(matches!(err, ExtractError::Io { .. }));
    }
}
