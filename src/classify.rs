//! Extension-based bucket classification.
//!
//! An extension maps to a bucket only when enough items with that extension
//! appear in the current run (the population threshold); sparse extensions
//! fall back to Miscellaneous so one-off files do not spawn near-empty
//! remote folders. A consequence worth knowing: the same physical file can
//! classify differently across runs when its extension's run-local
//! population crosses the threshold differently. Classification is
//! population-dependent, not a pure function of the file.

use std::collections::HashMap;

use crate::models::SourceItem;

/// Bucket receiving text documents; its items feed the knowledge store.
pub const DOCUMENTS: &str = "Documents";
pub const PDFS: &str = "PDFs";
pub const SPREADSHEETS: &str = "Spreadsheets";
pub const PRESENTATIONS: &str = "Presentations";
pub const CODE: &str = "Code";
pub const ARCHIVES: &str = "Archives";
pub const MISCELLANEOUS: &str = "Miscellaneous";
/// Reserved bucket for items failing size, readability, or processing checks.
pub const QUARANTINE: &str = "Quarantine";

/// The fixed set of managed bucket names. Folder cleanup never touches
/// these, and `ensure_bucket` only ever creates them.
pub const MANAGED_BUCKETS: &[&str] = &[
    DOCUMENTS,
    PDFS,
    SPREADSHEETS,
    PRESENTATIONS,
    CODE,
    ARCHIVES,
    MISCELLANEOUS,
    QUARANTINE,
];

/// Known extension → bucket mapping.
fn mapped_bucket(extension: &str) -> Option<&'static str> {
    match extension {
        ".txt" | ".md" | ".docx" => Some(DOCUMENTS),
        ".pdf" => Some(PDFS),
        ".csv" | ".xlsx" => Some(SPREADSHEETS),
        ".pptx" => Some(PRESENTATIONS),
        ".py" | ".rs" | ".js" | ".ipynb" | ".json" => Some(CODE),
        ".zip" | ".tar" | ".gz" | ".exe" | ".dmg" => Some(ARCHIVES),
        _ => None,
    }
}

/// Count extensions across this run's file population.
pub fn extension_histogram(files: &[SourceItem]) -> HashMap<String, usize> {
    let mut histogram = HashMap::new();
    for file in files {
        *histogram.entry(file.extension.clone()).or_insert(0) += 1;
    }
    histogram
}

/// Pick the bucket for an extension given the run-local histogram.
///
/// Deterministic within a run: the histogram is computed once before the
/// processing pass, so two items with the same extension always land in the
/// same bucket during a given run.
pub fn categorize(
    extension: &str,
    histogram: &HashMap<String, usize>,
    threshold: usize,
) -> &'static str {
    let Some(bucket) = mapped_bucket(extension) else {
        return MISCELLANEOUS;
    };
    if histogram.get(extension).copied().unwrap_or(0) >= threshold {
        bucket
    } else {
        MISCELLANEOUS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemKind;

    fn file(name: &str) -> SourceItem {
        SourceItem {
            id: name.to_string(),
            name: name.to_string(),
            extension: SourceItem::extension_of(name),
            size: 1,
            kind: ItemKind::File,
            parents: vec!["root".to_string()],
            limbo: false,
        }
    }

    #[test]
    fn unknown_extension_goes_to_miscellaneous() {
        let histogram = HashMap::from([(".xyz".to_string(), 50)]);
        assert_eq!(categorize(".xyz", &histogram, 10), MISCELLANEOUS);
        assert_eq!(categorize("", &histogram, 10), MISCELLANEOUS);
    }

    #[test]
    fn population_threshold_splits_csv_and_pdf() {
        // 12 csv items and 3 pdf items with threshold 10: csv reaches its
        // mapped bucket, pdf falls back to Miscellaneous.
        let mut files: Vec<SourceItem> = (0..12).map(|i| file(&format!("t{}.csv", i))).collect();
        files.extend((0..3).map(|i| file(&format!("r{}.pdf", i))));
        let histogram = extension_histogram(&files);

        assert_eq!(categorize(".csv", &histogram, 10), SPREADSHEETS);
        assert_eq!(categorize(".pdf", &histogram, 10), MISCELLANEOUS);
    }

    #[test]
    fn same_extension_always_same_bucket_within_a_run() {
        let files: Vec<SourceItem> = (0..10).map(|i| file(&format!("n{}.txt", i))).collect();
        let histogram = extension_histogram(&files);
        let first = categorize(".txt", &histogram, 10);
        for _ in 0..5 {
            assert_eq!(categorize(".txt", &histogram, 10), first);
        }
        assert_eq!(first, DOCUMENTS);
    }

    #[test]
    fn threshold_is_inclusive() {
        let histogram = HashMap::from([(".pdf".to_string(), 10)]);
        assert_eq!(categorize(".pdf", &histogram, 10), PDFS);
        let histogram = HashMap::from([(".pdf".to_string(), 9)]);
        assert_eq!(categorize(".pdf", &histogram, 10), MISCELLANEOUS);
    }
}
