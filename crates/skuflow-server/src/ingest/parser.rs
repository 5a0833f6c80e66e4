//! Streaming CSV decoding
//!
//! Two passes over the same input: [`count_rows`] walks every record once to
//! learn the total and surface structural errors before anything is written,
//! then [`RowReader`] hands out fixed-size batches of [`RawRow`]s.

use csv_async::{AsyncReaderBuilder, StringRecord};
use futures::stream::{BoxStream, StreamExt};
use thiserror::Error;

use super::{input::InputStream, models::RawRow};

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ParseError(#[from] csv_async::Error);

fn builder() -> AsyncReaderBuilder {
    let mut builder = AsyncReaderBuilder::new();
    builder.has_headers(true).flexible(true);
    builder
}

/// Number of data rows, header excluded
pub async fn count_rows(input: InputStream) -> Result<u64, ParseError> {
    let mut reader = builder().create_reader(input);
    reader.headers().await?;

    let mut records = std::pin::pin!(reader.into_records());
    let mut total = 0;
    while let Some(record) = records.next().await {
        record?;
        total += 1;
    }
    Ok(total)
}

/// Batches of header-keyed rows
pub struct RowReader {
    headers: Vec<String>,
    records: BoxStream<'static, Result<StringRecord, csv_async::Error>>,
}

impl RowReader {
    pub async fn open(input: InputStream) -> Result<Self, ParseError> {
        let mut reader = builder().create_reader(input);
        let headers = reader.headers().await?.iter().map(str::to_owned).collect();

        Ok(Self {
            headers,
            records: reader.into_records().boxed(),
        })
    }

    /// Up to `size` rows; empty once the input is exhausted
    pub async fn next_batch(&mut self, size: usize) -> Result<Vec<RawRow>, ParseError> {
        let mut batch = Vec::with_capacity(size);
        while batch.len() < size {
            match self.records.next().await {
                Some(record) => batch.push(self.keyed(&record?)),
                None => break,
            }
        }
        Ok(batch)
    }

    /// Pair cells with headers. Missing trailing cells are left out, extra
    /// cells are dropped and a repeated header keeps its last cell.
    fn keyed(&self, record: &StringRecord) -> RawRow {
        self.headers
            .iter()
            .zip(record.iter())
            .map(|(header, value)| (header.clone(), value.to_string()))
            .collect()
    }
}
