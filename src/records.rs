//! Streaming CSV input and output for record files.
//!
//! Records are read one at a time with `csv_core`, so quoted commas,
//! quotes and embedded newlines in `display_text` survive, and memory
//! stays bounded by the current record.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use csv_core::ReadRecordResult;

use crate::error::{Error, Result};

/// Default name of the free-text column.
pub const TEXT_COLUMN: &str = "display_text";

const BOM: char = '\u{feff}';

// ── Raw record reader ──────────────────────────────────────────────

/// Pulls whole CSV records out of a buffered byte stream.
pub struct RecordReader<R> {
    input: R,
    core: csv_core::Reader,
    output: Vec<u8>,
    ends: Vec<usize>,
    path: PathBuf,
    done: bool,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(input: R, path: impl Into<PathBuf>) -> Self {
        RecordReader {
            input,
            core: csv_core::Reader::new(),
            output: vec![0; 4096],
            ends: vec![0; 64],
            path: path.into(),
            done: false,
        }
    }

    /// Next record's fields, or `None` at end of input.
    pub fn read_record(&mut self) -> Result<Option<Vec<String>>> {
        if self.done {
            return Ok(None);
        }
        let mut out_len = 0;
        let mut ends_len = 0;
        loop {
            let buf = self
                .input
                .fill_buf()
                .map_err(|e| Error::io(&self.path, e))?;
            let (result, n_in, n_out, n_ends) = self.core.read_record(
                buf,
                &mut self.output[out_len..],
                &mut self.ends[ends_len..],
            );
            self.input.consume(n_in);
            out_len += n_out;
            ends_len += n_ends;
            match result {
                ReadRecordResult::InputEmpty => {}
                ReadRecordResult::OutputFull => {
                    let len = self.output.len();
                    self.output.resize(len * 2, 0);
                }
                ReadRecordResult::OutputEndsFull => {
                    let len = self.ends.len();
                    self.ends.resize(len * 2, 0);
                }
                ReadRecordResult::Record => return self.fields(out_len, ends_len).map(Some),
                ReadRecordResult::End => {
                    self.done = true;
                    return Ok(None);
                }
            }
        }
    }

    fn fields(&self, out_len: usize, ends_len: usize) -> Result<Vec<String>> {
        let data = &self.output[..out_len];
        let mut fields = Vec::with_capacity(ends_len);
        let mut start = 0;
        for &end in &self.ends[..ends_len] {
            let field = std::str::from_utf8(&data[start..end]).map_err(|e| Error::Csv {
                path: self.path.clone(),
                message: format!("invalid UTF-8 in field: {e}"),
            })?;
            fields.push(field.to_string());
            start = end;
        }
        Ok(fields)
    }
}

// ── Record source with header ──────────────────────────────────────

/// One data row; `text()` is the free-text field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub fields: Vec<String>,
    text_index: usize,
}

impl Row {
    /// The free-text field, or `""` if the row is too short to have one.
    pub fn text(&self) -> &str {
        self.fields
            .get(self.text_index)
            .map_or("", String::as_str)
    }
}

/// A CSV file with a header naming the free-text column.
pub struct RecordSource<R> {
    reader: RecordReader<R>,
    header: Vec<String>,
    text_index: usize,
}

impl RecordSource<BufReader<File>> {
    pub fn open(path: &Path, column: &str) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        Self::from_reader(BufReader::new(file), path, column)
    }
}

impl<R: BufRead> RecordSource<R> {
    pub fn from_reader(input: R, path: &Path, column: &str) -> Result<Self> {
        let mut reader = RecordReader::new(input, path);
        let mut header = reader.read_record()?.unwrap_or_default();
        // Excel-exported files start with a byte-order mark
        if let Some(first) = header.first_mut() {
            if let Some(stripped) = first.strip_prefix(BOM) {
                *first = stripped.to_string();
            }
        }
        let text_index = header
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| Error::MissingColumn {
                path: path.to_path_buf(),
                column: column.to_string(),
            })?;
        Ok(RecordSource {
            reader,
            header,
            text_index,
        })
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn next_row(&mut self) -> Result<Option<Row>> {
        Ok(self.reader.read_record()?.map(|fields| Row {
            fields,
            text_index: self.text_index,
        }))
    }
}

impl<R: BufRead> Iterator for RecordSource<R> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

// ── Output ─────────────────────────────────────────────────────────

/// Write one CSV cell, quoting only when needed.
fn quote_csv_cell<W: Write>(mut wtr: W, mut data: &[u8]) -> std::io::Result<()> {
    let mut output = [0; 4096];
    let mut writer = csv_core::Writer::new();
    loop {
        let (result, n_in, n_out) = writer.field(data, &mut output);
        wtr.write_all(&output[..n_out])?;
        if result == csv_core::WriteResult::InputEmpty {
            break;
        }
        data = &data[n_in..];
    }
    let (_, n_out) = writer.finish(&mut output);
    wtr.write_all(&output[..n_out])?;
    Ok(())
}

/// Writes CSV records line by line.
pub struct RowWriter<W> {
    out: W,
}

impl<W: Write> RowWriter<W> {
    pub fn new(out: W) -> Self {
        RowWriter { out }
    }

    pub fn write_record<'a, I>(&mut self, fields: I) -> std::io::Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for (i, field) in fields.into_iter().enumerate() {
            if i > 0 {
                self.out.write_all(b",")?;
            }
            quote_csv_cell(&mut self.out, field.as_bytes())?;
        }
        self.out.write_all(b"\n")
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.out.flush()
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(csv: &str) -> Result<RecordSource<&[u8]>> {
        RecordSource::from_reader(csv.as_bytes(), Path::new("test.csv"), TEXT_COLUMN)
    }

    #[test]
    fn test_reads_rows_and_text_column() {
        let mut src = source("id,display_text\n1,令和060401\n2,続き\n").unwrap();
        assert_eq!(src.header(), &["id", "display_text"]);
        let r1 = src.next_row().unwrap().unwrap();
        assert_eq!(r1.text(), "令和060401");
        let r2 = src.next_row().unwrap().unwrap();
        assert_eq!(r2.fields, vec!["2", "続き"]);
        assert!(src.next_row().unwrap().is_none());
        assert!(src.next_row().unwrap().is_none());
    }

    #[test]
    fn test_strips_bom() {
        let src = source("\u{feff}display_text,id\nx,1\n").unwrap();
        assert_eq!(src.header()[0], "display_text");
    }

    #[test]
    fn test_missing_column() {
        let err = source("id,text\n1,x\n").err().unwrap();
        assert!(matches!(err, Error::MissingColumn { .. }));
    }

    #[test]
    fn test_quoted_fields() {
        let csv = "display_text,id\n\"a, \"\"b\"\"\nc\",1\n";
        let rows: Vec<Row> = source(csv).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text(), "a, \"b\"\nc");
    }

    #[test]
    fn test_short_row_has_empty_text() {
        let rows: Vec<Row> = source("id,display_text\n1\n")
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(rows[0].text(), "");
    }

    #[test]
    fn test_crlf_and_no_trailing_newline() {
        let rows: Vec<Row> = source("display_text\r\nfoo\r\nbar")
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        let texts: Vec<&str> = rows.iter().map(Row::text).collect();
        assert_eq!(texts, vec!["foo", "bar"]);
    }

    #[test]
    fn test_large_record_grows_buffers() {
        let big = "あ".repeat(5000);
        let many: Vec<String> = (0..100).map(|i| i.to_string()).collect();
        let csv = format!("display_text,{}\n{big},{}\n", many.join(","), many.join(","));
        let rows: Vec<Row> = source(&csv).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(rows[0].text(), big);
        assert_eq!(rows[0].fields.len(), 101);
    }

    #[test]
    fn test_row_writer_quotes_when_needed() {
        let mut w = RowWriter::new(Vec::new());
        w.write_record(["plain", "a,b", "say \"hi\""]).unwrap();
        let out = String::from_utf8(w.into_inner()).unwrap();
        assert_eq!(out, "plain,\"a,b\",\"say \"\"hi\"\"\"\n");
    }
}
