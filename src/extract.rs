//! Per-format text extraction.
//!
//! The pipeline sees a single infallible entry point, [`extract_text`]:
//! whatever goes wrong inside a format routine collapses to an empty
//! string, and the empty-content gate downstream decides what to do with
//! the item. Internal routines keep `Result`s so the failure reason is
//! available at debug level.

use std::io::Read;

use tracing::debug;

/// Maximum decompressed bytes read from a single OOXML ZIP entry
/// (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extension families the curator can pull text out of. Everything else
/// yields an empty string.
pub fn is_extractable(extension: &str) -> bool {
    matches!(
        extension,
        ".txt" | ".md" | ".csv" | ".json" | ".py" | ".rs" | ".js" | ".pdf" | ".docx" | ".pptx"
            | ".xlsx"
    )
}

/// Extract plain text from raw bytes for the given extension.
///
/// Never fails and never panics: unsupported formats, corrupt archives, and
/// undecodable bytes all produce `""`.
pub fn extract_text(bytes: &[u8], extension: &str) -> String {
    let result = match extension {
        ".txt" | ".md" | ".csv" | ".json" | ".py" | ".rs" | ".js" => {
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
        ".pdf" => extract_pdf(bytes),
        ".docx" => extract_docx(bytes),
        ".pptx" => extract_pptx(bytes),
        ".xlsx" => extract_xlsx(bytes),
        _ => Ok(String::new()),
    };
    match result {
        Ok(text) => text,
        Err(reason) => {
            debug!(extension, %reason, "extraction failed, treating as empty");
            String::new()
        }
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, String> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| e.to_string())
}

fn open_archive(bytes: &[u8]) -> Result<zip::ZipArchive<std::io::Cursor<&[u8]>>, String> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| e.to_string())
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>, String> {
    let entry = archive.by_name(name).map_err(|e| e.to_string())?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| e.to_string())?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(format!("ZIP entry {} exceeds size limit", name));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String, String> {
    let mut archive = open_archive(bytes)?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml")?;
    collect_t_text(&xml)
}

fn extract_pptx(bytes: &[u8]) -> Result<String, String> {
    let mut archive = open_archive(bytes)?;
    let mut slide_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    slide_names.sort_by_key(|name| {
        name.trim_start_matches("ppt/slides/slide")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });

    let mut out = String::new();
    for name in slide_names {
        let xml = read_zip_entry_bounded(&mut archive, &name)?;
        let text = collect_t_text(&xml)?;
        if !out.is_empty() && !text.is_empty() {
            out.push(' ');
        }
        out.push_str(&text);
    }
    Ok(out)
}

fn extract_xlsx(bytes: &[u8]) -> Result<String, String> {
    let mut archive = open_archive(bytes)?;
    let shared = read_zip_entry_bounded(&mut archive, "xl/sharedStrings.xml")
        .map(|xml| collect_shared_strings(&xml))
        .unwrap_or_else(|_| Ok(Vec::new()))?;

    let mut sheet_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    sheet_names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });

    let mut out = String::new();
    for name in sheet_names {
        let xml = read_zip_entry_bounded(&mut archive, &name)?;
        let cells = collect_sheet_cells(&xml, &shared)?;
        if !out.is_empty() && !cells.is_empty() {
            out.push(' ');
        }
        out.push_str(&cells);
    }
    Ok(out)
}

/// Gather the text of every `<t>`-style element (`w:t` in docx, `a:t` in
/// pptx; namespaces are ignored via `local_name`).
fn collect_t_text(xml: &[u8]) -> Result<String, String> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        if !out.is_empty() {
                            out.push(' ');
                        }
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn collect_shared_strings(xml: &[u8]) -> Result<Vec<String>, String> {
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_si = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = true;
                } else if in_si && e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        strings.push(te.unescape().unwrap_or_default().into_owned());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = false;
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn collect_sheet_cells(xml: &[u8], shared: &[String]) -> Result<String, String> {
    let mut cells: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_v = false;
    let mut cell_is_shared = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"c" {
                    cell_is_shared = e.attributes().any(|a| {
                        a.as_ref()
                            .map(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s")
                            .unwrap_or(false)
                    });
                } else if e.local_name().as_ref() == b"v" {
                    in_v = true;
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_v => {
                let v = te.unescape().unwrap_or_default();
                let s = v.trim();
                if !s.is_empty() {
                    if cell_is_shared {
                        if let Ok(i) = s.parse::<usize>() {
                            if let Some(text) = shared.get(i) {
                                cells.push(text.clone());
                            }
                        }
                    } else {
                        cells.push(s.to_string());
                    }
                }
                in_v = false;
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"v" {
                    in_v = false;
                } else if e.local_name().as_ref() == b"c" {
                    cell_is_shared = false;
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }
    Ok(cells.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(extract_text(b"hello world", ".txt"), "hello world");
        assert_eq!(extract_text(b"a,b,c", ".csv"), "a,b,c");
    }

    #[test]
    fn unknown_extension_yields_empty() {
        assert_eq!(extract_text(b"\x00\x01\x02", ".exe"), "");
        assert_eq!(extract_text(b"anything", ""), "");
    }

    #[test]
    fn corrupt_pdf_yields_empty_not_error() {
        assert_eq!(extract_text(b"not a pdf at all", ".pdf"), "");
    }

    #[test]
    fn corrupt_archive_yields_empty_not_error() {
        assert_eq!(extract_text(b"not a zip", ".docx"), "");
        assert_eq!(extract_text(b"not a zip", ".pptx"), "");
        assert_eq!(extract_text(b"not a zip", ".xlsx"), "");
    }

    #[test]
    fn invalid_utf8_is_lossy_not_fatal() {
        let text = extract_text(&[0x68, 0x69, 0xFF, 0xFE], ".txt");
        assert!(text.starts_with("hi"));
    }
}
