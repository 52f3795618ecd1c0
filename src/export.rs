//! Report export: Word (.docx) and JSON.
//!
//! A `.docx` file is a zip archive of WordprocessingML parts. The report has
//! one heading and one bordered table; each page with items contributes one
//! row per item, and the page number is printed on the first row of its
//! group only. Pages without items are left out.
//!
//! ```text
//! [Content_Types].xml
//! _rels/.rels
//! word/document.xml
//! word/styles.xml
//! word/_rels/document.xml.rels
//! ```

use crate::error::ReviewError;
use crate::output::{AnalysisItem, PageRecord, TaskMode};
use serde_json::json;
use std::io::{Cursor, Write};
use std::path::Path;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Table width in twentieths of a point.
const TABLE_WIDTH: u32 = 9500;

pub fn report_title(mode: TaskMode) -> &'static str {
    match mode {
        TaskMode::Translate => "Translation Report",
        TaskMode::Proofread => "Proofreading Report",
    }
}

pub fn report_file_name(mode: TaskMode) -> &'static str {
    match mode {
        TaskMode::Translate => "translation-report.docx",
        TaskMode::Proofread => "proofreading-report.docx",
    }
}

/// Column headers and widths (twentieths of a point), page column first.
fn columns(mode: TaskMode) -> &'static [(&'static str, u32)] {
    match mode {
        TaskMode::Translate => &[
            ("Page", 1000),
            ("Original Title", 4250),
            ("English Translation", 4250),
        ],
        TaskMode::Proofread => &[
            ("Page", 1000),
            ("Error Excerpt", 2800),
            ("Suggested Fix", 2800),
            ("Reason", 2900),
        ],
    }
}

/// Mode of the first item found, for results whose run mode is unknown.
pub fn infer_mode(pages: &[PageRecord]) -> Option<TaskMode> {
    pages
        .iter()
        .flat_map(|p| p.items.first())
        .map(AnalysisItem::mode)
        .next()
}

/// Build a `.docx` report of every item matching `mode`.
pub fn docx_report(pages: &[PageRecord], mode: TaskMode) -> Result<Vec<u8>, ReviewError> {
    let document = document_xml(pages, mode);

    let parts: [(&str, &str); 5] = [
        ("[Content_Types].xml", CONTENT_TYPES_XML),
        ("_rels/.rels", ROOT_RELS_XML),
        ("word/_rels/document.xml.rels", DOCUMENT_RELS_XML),
        ("word/styles.xml", STYLES_XML),
        ("word/document.xml", &document),
    ];

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in parts {
        zip.start_file(name, options)
            .map_err(|e| ReviewError::ExportFailed(format!("{name}: {e}")))?;
        zip.write_all(body.as_bytes())
            .map_err(|e| ReviewError::ExportFailed(format!("{name}: {e}")))?;
    }
    let bytes = zip
        .finish()
        .map_err(|e| ReviewError::ExportFailed(e.to_string()))?
        .into_inner();

    debug!("Built {} ({} bytes)", report_file_name(mode), bytes.len());
    Ok(bytes)
}

/// Pretty-printed JSON of the mode and every page record.
pub fn json_report(pages: &[PageRecord], mode: TaskMode) -> Result<String, ReviewError> {
    serde_json::to_string_pretty(&json!({
        "mode": mode,
        "pages": pages,
    }))
    .map_err(|e| ReviewError::ExportFailed(e.to_string()))
}

/// Write `bytes` to `path` atomically: temp file in the same directory,
/// then rename.
pub async fn write_report(path: &Path, bytes: &[u8]) -> Result<(), ReviewError> {
    let write_failed = |source: std::io::Error| ReviewError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, bytes).await.map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_failed)?;

    info!("Report written to {}", path.display());
    Ok(())
}

// ── WordprocessingML ─────────────────────────────────────────────────────────

fn document_xml(pages: &[PageRecord], mode: TaskMode) -> String {
    let cols = columns(mode);
    let mut body = String::new();

    body.push_str(&paragraph(report_title(mode), Some("Heading1")));

    body.push_str("<w:tbl><w:tblPr><w:tblStyle w:val=\"TableGrid\"/>");
    body.push_str(&format!("<w:tblW w:w=\"{TABLE_WIDTH}\" w:type=\"dxa\"/>"));
    body.push_str(TABLE_BORDERS);
    body.push_str("</w:tblPr><w:tblGrid>");
    for (_, width) in cols {
        body.push_str(&format!("<w:gridCol w:w=\"{width}\"/>"));
    }
    body.push_str("</w:tblGrid>");

    body.push_str("<w:tr><w:trPr><w:tblHeader/></w:trPr>");
    for (label, width) in cols {
        body.push_str(&cell(label, Some(*width), Some("Heading2")));
    }
    body.push_str("</w:tr>");

    let mut rows = 0;
    for page in pages {
        let items = page.items.iter().filter(|item| item.mode() == mode);
        for (i, item) in items.enumerate() {
            let number = if i == 0 {
                page.page_number.to_string()
            } else {
                String::new()
            };
            body.push_str("<w:tr>");
            body.push_str(&cell(&number, None, None));
            for value in item.cells() {
                body.push_str(&cell(value, None, None));
            }
            body.push_str("</w:tr>");
            rows += 1;
        }
    }
    body.push_str("</w:tbl>");
    // A document must end with a paragraph, not a table.
    body.push_str("<w:p/>");

    debug!("Report table: {} rows", rows);

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
<w:body>{body}<w:sectPr/></w:body></w:document>"
    )
}

fn paragraph(text: &str, style: Option<&str>) -> String {
    let props = style
        .map(|s| format!("<w:pPr><w:pStyle w:val=\"{s}\"/></w:pPr>"))
        .unwrap_or_default();
    if text.is_empty() {
        return format!("<w:p>{props}</w:p>");
    }
    let runs = text
        .split('\n')
        .map(|line| format!("<w:t xml:space=\"preserve\">{}</w:t>", escape_xml(line)))
        .collect::<Vec<_>>()
        .join("<w:br/>");
    format!("<w:p>{props}<w:r>{runs}</w:r></w:p>")
}

fn cell(text: &str, width: Option<u32>, style: Option<&str>) -> String {
    let props = width
        .map(|w| format!("<w:tcPr><w:tcW w:w=\"{w}\" w:type=\"dxa\"/></w:tcPr>"))
        .unwrap_or_default();
    format!("<w:tc>{props}{}</w:tc>", paragraph(text, style))
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // Control characters are not allowed in XML 1.0.
            c if (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r') => {}
            c => out.push(c),
        }
    }
    out
}

const TABLE_BORDERS: &str = "<w:tblBorders>\
<w:top w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"000000\"/>\
<w:left w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"000000\"/>\
<w:bottom w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"000000\"/>\
<w:right w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"000000\"/>\
<w:insideH w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"000000\"/>\
<w:insideV w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"000000\"/>\
</w:tblBorders>";

const CONTENT_TYPES_XML: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
<Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
<Default Extension=\"xml\" ContentType=\"application/xml\"/>\
<Override PartName=\"/word/document.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml\"/>\
<Override PartName=\"/word/styles.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml\"/>\
</Types>";

const ROOT_RELS_XML: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
<Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" Target=\"word/document.xml\"/>\
</Relationships>";

const DOCUMENT_RELS_XML: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
<Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles\" Target=\"styles.xml\"/>\
</Relationships>";

const STYLES_XML: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<w:styles xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
<w:style w:type=\"paragraph\" w:default=\"1\" w:styleId=\"Normal\"><w:name w:val=\"Normal\"/></w:style>\
<w:style w:type=\"paragraph\" w:styleId=\"Heading1\"><w:name w:val=\"heading 1\"/><w:basedOn w:val=\"Normal\"/>\
<w:pPr><w:spacing w:after=\"200\"/><w:outlineLvl w:val=\"0\"/></w:pPr><w:rPr><w:b/><w:sz w:val=\"32\"/></w:rPr></w:style>\
<w:style w:type=\"paragraph\" w:styleId=\"Heading2\"><w:name w:val=\"heading 2\"/><w:basedOn w:val=\"Normal\"/>\
<w:pPr><w:outlineLvl w:val=\"1\"/></w:pPr><w:rPr><w:b/><w:sz w:val=\"26\"/></w:rPr></w:style>\
<w:style w:type=\"table\" w:styleId=\"TableGrid\"><w:name w:val=\"Table Grid\"/></w:style>\
</w:styles>";
