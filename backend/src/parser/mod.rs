//! CSV parsing with encoding and delimiter auto-detection.
//!
//! Turns raw upload bytes into a header-derived column list (with inferred
//! types) and annotated [`CsvRow`]s. Quoted fields, embedded delimiters and
//! escaped quotes are handled by the `csv` tokenizer.

pub mod infer;

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{CsvError, CsvResult};
use crate::models::{CsvColumn, CsvRow};

pub use infer::{infer_type, is_boolean, is_number, parse_date, SAMPLE_SIZE};

/// Offset between a zero-based data index and the displayed row number
/// (1-based numbering plus the header line).
pub const ROW_INDEX_OFFSET: usize = 2;

/// Columns and rows of a parsed file.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedCsv {
    pub columns: Vec<CsvColumn>,
    pub rows: Vec<CsvRow>,
}

impl ParsedCsv {
    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// File information gathered while decoding.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvInfo {
    pub encoding: String,
    pub delimiter: char,
    pub headers: Vec<String>,
    pub row_count: usize,
}

/// Result of parsing raw bytes, with detection metadata.
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub csv: ParsedCsv,
    pub info: CsvInfo,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        // labels encoding_rs cannot decode are read as lossy utf-8
        other if encoding_rs::Encoding::for_label(other.as_bytes()).is_none() => {
            "utf-8".to_string()
        }
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> CsvResult<String> {
    let decoded = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => String::from_utf8_lossy(bytes).to_string(),
        },
        "iso-8859-1" | "latin-1" | "latin1" => {
            encoding_rs::ISO_8859_15.decode(bytes).0.to_string()
        }
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.to_string(),
        other => match encoding_rs::Encoding::for_label(other.as_bytes()) {
            Some(enc) => enc.decode(bytes).0.to_string(),
            None => {
                return Err(CsvError::EncodingError(format!(
                    "unsupported encoding '{}'",
                    encoding
                )))
            }
        },
    };

    Ok(decoded.trim_start_matches('\u{feff}').to_string())
}

/// Detect the delimiter by counting occurrences in the first non-blank line.
///
/// Comma wins ties, including the single-column case.
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content
        .lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse comma-separated text.
///
/// # Example
/// ```ignore
/// use kbimport::parse_csv;
///
/// let parsed = parse_csv("Title,Sector\nDocA,rail\nDocB,maritime").unwrap();
///
/// assert_eq!(parsed.rows.len(), 2);
/// assert_eq!(parsed.rows[0].get("Title"), "DocA");
/// assert_eq!(parsed.rows[0].row_index, 2);
/// ```
pub fn parse_csv(content: &str) -> CsvResult<ParsedCsv> {
    parse_with_delimiter(content, ',')
}

/// Parse text with an explicit delimiter.
pub fn parse_with_delimiter(content: &str, delimiter: char) -> CsvResult<ParsedCsv> {
    if !delimiter.is_ascii() {
        return Err(CsvError::ParseError {
            line: 0,
            message: format!("delimiter '{}' is not an ASCII character", delimiter),
        });
    }

    let content = content.trim_start_matches('\u{feff}');
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .delimiter(delimiter as u8)
        .from_reader(content.as_bytes());

    let mut records = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| CsvError::ParseError {
            line: e
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(idx + 1),
            message: e.to_string(),
        })?;

        // Blank lines (or lines of empty cells) carry no data
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        records.push(record);
    }

    let mut records = records.into_iter();
    let header = records.next().ok_or(CsvError::EmptyFile)?;
    let headers: Vec<String> = header
        .iter()
        .map(|h| h.trim_matches('"').to_string())
        .collect();

    let rows: Vec<CsvRow> = records
        .enumerate()
        .map(|(data_idx, record)| {
            let values: BTreeMap<String, String> = headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.clone(), record.get(i).unwrap_or("").to_string()))
                .collect();
            CsvRow::new(data_idx + ROW_INDEX_OFFSET, values)
        })
        .collect();

    let columns = headers
        .iter()
        .map(|h| {
            let samples: Vec<&str> = rows
                .iter()
                .map(|r| r.get(h))
                .filter(|v| !v.trim().is_empty())
                .take(SAMPLE_SIZE)
                .collect();
            CsvColumn::new(h.clone(), infer_type(&samples))
        })
        .collect();

    Ok(ParsedCsv { columns, rows })
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes(bytes: &[u8]) -> CsvResult<ParseResult> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = detect_delimiter(&content);

    let csv = parse_with_delimiter(&content, delimiter)?;
    let info = CsvInfo {
        encoding,
        delimiter,
        headers: csv.headers(),
        row_count: csv.rows.len(),
    };

    Ok(ParseResult { csv, info })
}

/// Parse a CSV file with auto-detection of encoding and delimiter.
///
/// # Example
/// ```ignore
/// let result = parse_file("/path/to/documents.csv")?;
/// println!("Encoding: {}, Delimiter: '{}'", result.info.encoding, result.info.delimiter);
/// println!("Rows: {}", result.csv.rows.len());
/// ```
pub fn parse_file<P: AsRef<Path>>(path: P) -> CsvResult<ParseResult> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ColumnType;

    #[test]
    fn test_simple_csv() {
        let parsed = parse_csv("Title,Sector\nDocA,rail\nDocB,maritime").unwrap();

        assert_eq!(parsed.columns.len(), 2);
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[0].get("Title"), "DocA");
        assert_eq!(parsed.rows[1].get("Sector"), "maritime");
    }

    #[test]
    fn test_row_index_offset() {
        let parsed = parse_csv("a\n1\n2\n3\n4").unwrap();
        let indices: Vec<usize> = parsed.rows.iter().map(|r| r.row_index).collect();
        assert_eq!(indices, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_blank_lines_dropped() {
        let parsed = parse_csv("\n\na,b\n1,2\n\n   \n3,4\n").unwrap();
        assert_eq!(parsed.headers(), vec!["a", "b"]);
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[1].row_index, 3);
    }

    #[test]
    fn test_empty_file_error() {
        assert!(matches!(parse_csv(""), Err(CsvError::EmptyFile)));
        assert!(matches!(parse_csv("\n \n\n"), Err(CsvError::EmptyFile)));
    }

    #[test]
    fn test_quoted_fields_with_commas() {
        let csv = "Title,Description\n\"Ports, Harbours\",\"He said \"\"hi\"\"\"";
        let parsed = parse_csv(csv).unwrap();

        assert_eq!(parsed.rows[0].get("Title"), "Ports, Harbours");
        assert_eq!(parsed.rows[0].get("Description"), "He said \"hi\"");
    }

    #[test]
    fn test_missing_and_extra_values() {
        let parsed = parse_csv("a,b,c\n1,,3\n4\n5,6,7,8").unwrap();

        assert_eq!(parsed.rows[0].get("b"), "");
        assert_eq!(parsed.rows[1].get("c"), "");
        assert_eq!(parsed.rows[2].get("c"), "7");
        assert_eq!(parsed.rows[2].values.len(), 3);
    }

    #[test]
    fn test_column_type_inference() {
        let csv = "Pages,Published,Active,Title\n10,2024-01-01,yes,A\n20,2024-02-01,no,B\n,,,C";
        let parsed = parse_csv(csv).unwrap();

        let types: Vec<ColumnType> = parsed.columns.iter().map(|c| c.column_type).collect();
        assert_eq!(
            types,
            vec![
                ColumnType::Number,
                ColumnType::Date,
                ColumnType::Boolean,
                ColumnType::String
            ]
        );
    }

    #[test]
    fn test_header_only_columns_are_strings() {
        let parsed = parse_csv("Title,Date").unwrap();
        assert!(parsed.rows.is_empty());
        assert!(parsed
            .columns
            .iter()
            .all(|c| c.column_type == ColumnType::String));
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3"), '\t');
        assert_eq!(detect_delimiter("a|b|c\n1|2|3"), '|');
        assert_eq!(detect_delimiter("Title\nDocA"), ',');
    }

    #[test]
    fn test_parse_bytes_auto() {
        let result = parse_bytes("Title;Sector\nDocA;rail".as_bytes()).unwrap();

        assert_eq!(result.info.delimiter, ';');
        assert_eq!(result.info.row_count, 1);
        assert_eq!(result.info.headers, vec!["Title", "Sector"]);
    }

    #[test]
    fn test_bom_stripped() {
        let result = parse_bytes("\u{feff}Title,Sector\nDocA,rail".as_bytes()).unwrap();
        assert_eq!(result.info.headers[0], "Title");
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1").unwrap();
        assert_eq!(decoded, "Société");
    }

    #[test]
    fn test_unknown_encoding_rejected() {
        let err = decode_content(b"Title\nDocA", "klingon-8").unwrap_err();
        assert!(matches!(err, CsvError::EncodingError(msg) if msg.contains("klingon-8")));
        assert_eq!(decode_content(b"Title", "shift_jis").unwrap(), "Title");
    }

    #[test]
    fn test_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.csv");
        std::fs::write(&path, "Title,Sector\nDocA,rail\n").unwrap();

        let result = parse_file(&path).unwrap();
        assert_eq!(result.csv.rows.len(), 1);
    }
}
