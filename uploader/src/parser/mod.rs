//! Header-aware CSV row reader with encoding and delimiter detection.
//!
//! [`RowReader`] yields one [`Row`] per data line, lazily. Opening a file
//! again starts a fresh pass from the first data line.
//!
//! Files are streamed from disk and decoded field by field. The encoding is
//! detected on the first 64 KiB; a field that is not valid UTF-8 in a file
//! detected as UTF-8 is read as Windows-1252, so a late accented byte never
//! aborts an upload.
//!
//! Row line numbers are physical lines of the source, counted outside the
//! `csv` reader because its record positions point at skipped blank lines.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read};
use std::path::Path;
use std::rc::Rc;

use crate::error::{CsvError, CsvResult};
use crate::models::Row;

/// Bytes inspected for encoding and delimiter detection.
const SAMPLE_SIZE: usize = 64 * 1024;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "" | "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.into_owned(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        // UTF-8 and anything unknown, Windows-1252 when not valid UTF-8
        _ => match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        },
    }
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> u8 {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [b';', b',', b'\t', b'|'];
    let mut best_sep = b',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep as char).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

// =============================================================================
// Physical line tracking
// =============================================================================

/// Byte offsets of every non-blank line start seen so far, with their line
/// numbers. Entries behind the current record are dropped as reading moves on.
#[derive(Debug)]
struct LineIndex {
    offset: u64,
    line: u64,
    at_line_start: bool,
    starts: VecDeque<(u64, u64)>,
}

impl Default for LineIndex {
    fn default() -> Self {
        Self {
            offset: 0,
            line: 1,
            at_line_start: true,
            starts: VecDeque::new(),
        }
    }
}

impl LineIndex {
    fn observe(&mut self, bytes: &[u8]) {
        for &b in bytes {
            match b {
                b'\n' => {
                    self.line += 1;
                    self.at_line_start = true;
                }
                b'\r' => {}
                _ if self.at_line_start => {
                    self.starts.push_back((self.offset, self.line));
                    self.at_line_start = false;
                }
                _ => {}
            }
            self.offset += 1;
        }
    }

    /// Line of the first non-blank line starting at or after `offset`.
    fn line_from(&mut self, offset: u64) -> Option<u64> {
        while self.starts.front().is_some_and(|&(start, _)| start < offset) {
            self.starts.pop_front();
        }
        self.starts.front().map(|&(_, line)| line)
    }
}

/// Feeds every byte handed to the `csv` reader through a [`LineIndex`].
struct Tracked<R> {
    inner: R,
    index: Rc<RefCell<LineIndex>>,
}

impl<R: Read> Read for Tracked<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.index.borrow_mut().observe(&buf[..n]);
        Ok(n)
    }
}

// =============================================================================
// Row reader
// =============================================================================

/// Lazy sequence of rows read from a delimited file.
pub struct RowReader {
    reader: csv::Reader<Tracked<Box<dyn Read>>>,
    lines: Rc<RefCell<LineIndex>>,
    headers: Vec<String>,
    record: csv::ByteRecord,
    number: u64,
    encoding: String,
    delimiter: u8,
}

impl std::fmt::Debug for RowReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowReader")
            .field("headers", &self.headers)
            .field("number", &self.number)
            .field("encoding", &self.encoding)
            .field("delimiter", &(self.delimiter as char))
            .finish()
    }
}

impl RowReader {
    /// Open a file. `delimiter` of `None` detects it from the header line.
    pub fn open<P: AsRef<Path>>(path: P, delimiter: Option<u8>) -> CsvResult<Self> {
        let mut file = BufReader::new(File::open(path.as_ref())?);

        let sample = strip_bom(read_sample(&mut file)?);
        let encoding = detect_encoding(&sample);
        let delimiter = delimiter.unwrap_or_else(|| detect_delimiter(&decode_content(&sample, &encoding)));

        // Rewind by chaining the sample back in front of the rest of the file.
        let source: Box<dyn Read> = Box::new(Cursor::new(sample).chain(file));
        Self::from_source(source, delimiter, encoding)
    }

    /// Read from in-memory bytes, with the same detection as [`RowReader::open`].
    pub fn from_bytes(bytes: &[u8], delimiter: Option<u8>) -> CsvResult<Self> {
        let bytes = strip_bom_slice(bytes);
        let sample = &bytes[..bytes.len().min(SAMPLE_SIZE)];
        let encoding = detect_encoding(sample);
        let delimiter = delimiter.unwrap_or_else(|| detect_delimiter(&decode_content(sample, &encoding)));
        Self::from_source(Box::new(Cursor::new(bytes.to_vec())), delimiter, encoding)
    }

    fn from_source(source: Box<dyn Read>, delimiter: u8, encoding: String) -> CsvResult<Self> {
        let lines = Rc::new(RefCell::new(LineIndex::default()));
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(Tracked {
                inner: source,
                index: Rc::clone(&lines),
            });

        let headers: Vec<String> = reader
            .byte_headers()?
            .iter()
            .map(|h| decode_content(h, &encoding))
            .collect();

        if headers.is_empty() {
            return Err(CsvError::EmptyFile);
        }
        if headers.iter().all(|h| h.is_empty()) {
            return Err(CsvError::NoHeaders);
        }

        Ok(Self {
            reader,
            lines,
            headers,
            record: csv::ByteRecord::new(),
            number: 0,
            encoding,
            delimiter,
        })
    }

    /// Column names from the header line.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Detected or assumed encoding.
    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    /// Delimiter in use.
    pub fn delimiter(&self) -> char {
        self.delimiter as char
    }

    fn next_row(&mut self) -> CsvResult<Option<Row>> {
        loop {
            if !self.reader.read_byte_record(&mut self.record)? {
                return Ok(None);
            }
            // whitespace-only lines
            if self.record.len() == 1 && self.record[0].is_empty() && self.headers.len() > 1 {
                continue;
            }
            break;
        }

        self.number += 1;
        // the record position is where scanning started, before any blank lines
        let line = self
            .record
            .position()
            .and_then(|p| self.lines.borrow_mut().line_from(p.byte()))
            .unwrap_or(self.number + 1);

        // Missing trailing fields read as empty, extra fields are ignored.
        let fields = self
            .headers
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let value = self
                    .record
                    .get(i)
                    .map(|b| decode_content(b, &self.encoding))
                    .unwrap_or_default();
                (h.clone(), value)
            })
            .collect();

        Ok(Some(Row {
            number: self.number,
            line,
            fields,
        }))
    }
}

impl Iterator for RowReader {
    type Item = CsvResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

fn read_sample<R: BufRead>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let mut sample = Vec::with_capacity(SAMPLE_SIZE);
    reader.take(SAMPLE_SIZE as u64).read_to_end(&mut sample)?;
    Ok(sample)
}

fn strip_bom(mut bytes: Vec<u8>) -> Vec<u8> {
    if bytes.starts_with(UTF8_BOM) {
        bytes.drain(..UTF8_BOM.len());
    }
    bytes
}

fn strip_bom_slice(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    fn rows(csv: &str, delimiter: Option<u8>) -> Vec<Row> {
        RowReader::from_bytes(csv.as_bytes(), delimiter)
            .unwrap()
            .collect::<CsvResult<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_simple_csv() {
        let rows = rows("name,email\nJohn,john@x.com\nJane,jane@x.com", Some(b','));

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].number, 1);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[0].get("name"), Some("John"));
        assert_eq!(rows[1].number, 2);
        assert_eq!(rows[1].line, 3);
        assert_eq!(rows[1].get("email"), Some("jane@x.com"));
    }

    #[test]
    fn test_fields_keep_header_order() {
        let rows = rows("b,a,c\n2,1,3", Some(b','));
        let columns: Vec<_> = rows[0].fields.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(columns, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_quoted_values() {
        let rows = rows("name;value\n\"Alice\";\"Hello; World\"", Some(b';'));
        assert_eq!(rows[0].get("name"), Some("Alice"));
        assert_eq!(rows[0].get("value"), Some("Hello; World"));
    }

    #[test]
    fn test_values_are_trimmed() {
        let rows = rows("name , email\n  John  , j@x.com ", Some(b','));
        assert_eq!(rows[0].get("name"), Some("John"));
        assert_eq!(rows[0].get("email"), Some("j@x.com"));
    }

    #[test]
    fn test_empty_lines_skipped() {
        let rows = rows("a,b\n1,2\n\n3,4\n", Some(b','));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].number, 2);
        assert_eq!(rows[1].line, 4);
    }

    #[test]
    fn test_lines_after_blank_and_whitespace_lines() {
        let rows = rows("name,email\nJohn,j@x.com\n\n\n   \nJane,bad\n", Some(b','));
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[1].number, rows[1].line), (2, 6));
        assert_eq!(rows[1].get("name"), Some("Jane"));
    }

    #[test]
    fn test_lines_with_quoted_newlines() {
        let rows = rows("name,note\n\"Ann\",\"two\nlines\"\nBob,x\n\nCid,\"a\n\nb\"\nDan,y", Some(b','));
        let lines: Vec<_> = rows.iter().map(|r| (r.number, r.line)).collect();
        assert_eq!(lines, vec![(1, 2), (2, 4), (3, 6), (4, 9)]);
        assert_eq!(rows[0].get("note"), Some("two\nlines"));
        assert_eq!(rows[2].get("note"), Some("a\n\nb"));
    }

    #[test]
    fn test_lines_with_crlf() {
        let rows = rows("a,b\r\n1,2\r\n\r\n3,4\r\n", Some(b','));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[1].line, 4);
        assert_eq!(rows[1].get("b"), Some("4"));
    }

    #[test]
    fn test_missing_and_extra_values() {
        let rows = rows("a,b,c\n1\n1,2,3,4", Some(b','));
        assert_eq!(rows[0].get("b"), Some(""));
        assert_eq!(rows[0].get("c"), Some(""));
        assert_eq!(rows[1].fields.len(), 3);
    }

    #[test]
    fn test_header_only_file_has_no_rows() {
        assert!(rows("name,email\n", Some(b',')).is_empty());
    }

    #[test]
    fn test_empty_csv_error() {
        let err = RowReader::from_bytes(b"", Some(b',')).unwrap_err();
        assert!(matches!(err, CsvError::EmptyFile | CsvError::NoHeaders));
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), b';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), b',');
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3"), b'\t');
        assert_eq!(detect_delimiter("a|b|c\n1|2|3"), b'|');
    }

    #[test]
    fn test_auto_delimiter() {
        let reader = RowReader::from_bytes(b"name;age\nAlice;30", None).unwrap();
        assert_eq!(reader.delimiter(), ';');
        assert_eq!(reader.headers(), &["name".to_string(), "age".to_string()]);
    }

    #[test]
    fn test_open_file_with_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.csv");
        let mut file = File::create(&path).unwrap();
        file.write_all(b"\xEF\xBB\xBFname,email\nJohn,john@x.com\n").unwrap();

        let mut reader = RowReader::open(&path, Some(b',')).unwrap();
        assert_eq!(reader.headers()[0], "name");
        let row = reader.next().unwrap().unwrap();
        assert_eq!(row.get("name"), Some("John"));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_late_latin1_byte_in_utf8_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.csv");
        let mut content = b"name,email\n".to_vec();
        for i in 0..8000 {
            content.extend_from_slice(format!("user{},user{}@example.com\n", i, i).as_bytes());
        }
        // "José" in ISO-8859-1, well past the detection sample
        content.extend_from_slice(b"Jos\xE9,jose@example.com\n");
        assert!(content.len() > SAMPLE_SIZE * 2);
        fs::write(&path, &content).unwrap();

        let reader = RowReader::open(&path, Some(b',')).unwrap();
        assert_eq!(reader.encoding(), "utf-8");
        let rows = reader.collect::<CsvResult<Vec<_>>>().unwrap();
        assert_eq!(rows.len(), 8001);
        let last = rows.last().unwrap();
        assert_eq!(last.get("name"), Some("José"));
        assert_eq!(last.line, 8002);
    }

    #[test]
    fn test_latin1_file_is_decoded() {
        let rows = RowReader::from_bytes(b"name;city\nRen\xE9;Orl\xE9ans\nZo\xE9;S\xE8te\n", None)
            .unwrap()
            .collect::<CsvResult<Vec<_>>>()
            .unwrap();
        assert_eq!(rows[0].get("name"), Some("René"));
        assert_eq!(rows[1].get("city"), Some("Sète"));
    }

    #[test]
    fn test_utf8_is_kept() {
        let rows = rows("name\nJosé\n", Some(b','));
        assert_eq!(rows[0].get("name"), Some("José"));
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1");
        assert_eq!(decoded, "Société");
    }
}
