use serde::Serialize;

use crate::{BatchResult, FileResult};

/// Default prefix of output record URIs.
pub const TYPE_URI: &str = "urn:x-pdfextract:PdfExtract";
/// Name of the single value path every record carries.
pub const SCHEMA_PATH: &str = "pdf_extract_output";

/// One output entity: a URI and the JSON of one file (or of all files).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRecord {
    pub uri: String,
    pub value: serde_json::Value,
}

impl OutputRecord {
    /// URI of the `n`-th record (1-based).
    pub fn uri_for(type_uri: &str, n: usize) -> String {
        format!("{type_uri}_{n}")
    }
}

impl BatchResult {
    /// Turn the batch into output records, keeping completion order.
    pub fn into_records(self, type_uri: &str) -> Result<Vec<OutputRecord>, serde_json::Error> {
        match self {
            BatchResult::PerFile(files) => files
                .into_iter()
                .enumerate()
                .map(|(i, file)| {
                    Ok(OutputRecord {
                        uri: OutputRecord::uri_for(type_uri, i + 1),
                        value: file_value(&file)?,
                    })
                })
                .collect(),
            BatchResult::Combined(files) => {
                let values = files
                    .iter()
                    .map(file_value)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(vec![OutputRecord {
                    uri: OutputRecord::uri_for(type_uri, 1),
                    value: serde_json::Value::Array(values),
                }])
            }
        }
    }
}

/// The record value of one file: `{"metadata": {...}, "pages": [...]}`.
fn file_value(file: &FileResult) -> Result<serde_json::Value, serde_json::Error> {
    #[derive(Serialize)]
    struct FileValue<'a> {
        metadata: &'a std::collections::BTreeMap<String, String>,
        pages: &'a [crate::PageResult],
    }
    serde_json::to_value(FileValue {
        metadata: &file.metadata,
        pages: &file.pages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PageResult;

    fn two_files() -> Vec<FileResult> {
        let mut a = FileResult::new("a.pdf");
        a.pages.push(PageResult::success(1, "hello".into(), vec![]));
        let b = FileResult::failed("b.pdf", "not a PDF");
        vec![a, b]
    }

    #[test]
    fn per_file_records_are_numbered_from_one() {
        let records = BatchResult::PerFile(two_files())
            .into_records(TYPE_URI)
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].uri, "urn:x-pdfextract:PdfExtract_1");
        assert_eq!(records[1].uri, "urn:x-pdfextract:PdfExtract_2");
        assert_eq!(
            records[0].value,
            serde_json::json!({
                "metadata": {"Filename": "a.pdf"},
                "pages": [{"page_number": 1, "text": "hello", "tables": []}]
            })
        );
        assert_eq!(
            records[1].value,
            serde_json::json!({
                "metadata": {"Filename": "b.pdf", "error": "not a PDF"},
                "pages": []
            })
        );
    }

    #[test]
    fn combined_mode_yields_one_array_record() {
        let records = BatchResult::Combined(two_files())
            .into_records("urn:test")
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].uri, "urn:test_1");
        assert_eq!(records[0].value.as_array().unwrap().len(), 2);
    }
}
