// Uploaded CSV handling: parse into a table, write back out as canonical CSV.

use std::io::Read;

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("No columns to parse from file")]
    Empty,
    #[error("Error tokenizing data. Expected {expected} fields in line {line}, saw {found}")]
    TooManyFields {
        line: u64,
        expected: usize,
        found: usize,
    },
    #[error("failed to parse delimited data: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to write delimited data: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialized data is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// A header row plus data rows. Every row has exactly `headers.len()` fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Dataset {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DatasetError> {
        Self::from_reader(bytes)
    }

    /// Reads comma-separated text with a header line. Short rows are padded
    /// with empty fields; long rows are rejected.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DatasetError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if headers.is_empty() {
            return Err(DatasetError::Empty);
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            if record.len() > headers.len() {
                return Err(DatasetError::TooManyFields {
                    line: record.position().map(|p| p.line()).unwrap_or_default(),
                    expected: headers.len(),
                    found: record.len(),
                });
            }
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(headers.len(), String::new());
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    /// Comma separated, `\n` terminated, quoting only where needed.
    pub fn to_csv_string(&self) -> Result<String, DatasetError> {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());

        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }

        let bytes = writer.into_inner().map_err(|e| e.into_error())?;
        Ok(String::from_utf8(bytes)?)
    }
}
