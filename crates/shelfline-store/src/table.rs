//! Parquet table of collected books, written via tmp file + atomic rename

use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use arrow::array::{Array, ArrayRef, Int32Array, RecordBatch, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use shelfline_core::CollectedBook;

/// Book table schema. Column names double as the table's public contract.
pub static BOOK_SCHEMA: LazyLock<Arc<Schema>> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("author", DataType::Utf8, false),
        Field::new("year", DataType::Int32, true),
        Field::new("source_id", DataType::Utf8, false),
        Field::new("file_reference", DataType::Utf8, false),
        Field::new("word_count", DataType::UInt64, false),
    ]))
});

fn string_column(books: &[CollectedBook], f: impl Fn(&CollectedBook) -> &str) -> ArrayRef {
    Arc::new(StringArray::from(books.iter().map(f).collect::<Vec<_>>()))
}

fn to_batch(books: &[CollectedBook]) -> io::Result<RecordBatch> {
    let columns: Vec<ArrayRef> = vec![
        string_column(books, |b| b.id.as_str()),
        string_column(books, |b| b.title.as_str()),
        string_column(books, |b| b.author.as_str()),
        Arc::new(Int32Array::from(
            books.iter().map(|b| b.year).collect::<Vec<_>>(),
        )),
        string_column(books, |b| b.source_id.as_str()),
        string_column(books, |b| b.file_reference.as_str()),
        Arc::new(UInt64Array::from(
            books.iter().map(|b| b.word_count).collect::<Vec<_>>(),
        )),
    ];
    RecordBatch::try_new(BOOK_SCHEMA.clone(), columns).map_err(io::Error::other)
}

/// Rewrite the whole table at `path`.
///
/// Rows go to `<path>.tmp` first and are renamed over `path` only after the
/// parquet footer is flushed, so a crash leaves the previous table intact.
pub fn write_books(path: &Path, books: &[CollectedBook], zstd_level: i32) -> io::Result<()> {
    let tmp_path = path.with_extension("parquet.tmp");
    if tmp_path.exists() {
        fs::remove_file(&tmp_path)?;
    }

    let level = ZstdLevel::try_new(zstd_level)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(level))
        .build();

    let file = File::create(&tmp_path)?;
    let mut writer = ArrowWriter::try_new(file, BOOK_SCHEMA.clone(), Some(props))
        .map_err(io::Error::other)?;
    if !books.is_empty() {
        writer.write(&to_batch(books)?).map_err(io::Error::other)?;
    }
    let file = writer.into_inner().map_err(io::Error::other)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> io::Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("missing or mistyped column: {name}"),
            )
        })
}

/// Read every row of the table at `path`
pub fn read_books(path: &Path) -> io::Result<Vec<CollectedBook>> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(io::Error::other)?
        .build()
        .map_err(io::Error::other)?;

    let mut books = Vec::new();
    for batch in reader {
        let batch = batch.map_err(io::Error::other)?;
        let id = column::<StringArray>(&batch, "id")?;
        let title = column::<StringArray>(&batch, "title")?;
        let author = column::<StringArray>(&batch, "author")?;
        let year = column::<Int32Array>(&batch, "year")?;
        let source_id = column::<StringArray>(&batch, "source_id")?;
        let file_reference = column::<StringArray>(&batch, "file_reference")?;
        let word_count = column::<UInt64Array>(&batch, "word_count")?;

        for i in 0..batch.num_rows() {
            books.push(CollectedBook {
                id: id.value(i).to_string(),
                title: title.value(i).to_string(),
                author: author.value(i).to_string(),
                year: (!year.is_null(i)).then(|| year.value(i)),
                source_id: source_id.value(i).to_string(),
                file_reference: file_reference.value(i).to_string(),
                word_count: word_count.value(i),
            });
        }
    }
    Ok(books)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn book(id: &str, year: Option<i32>) -> CollectedBook {
        CollectedBook {
            id: id.to_string(),
            title: format!("Title {id}"),
            author: "Anthony Trollope".to_string(),
            year,
            source_id: format!("ia_{id}"),
            file_reference: format!("texts/{id}.txt"),
            word_count: 12_345,
        }
    }

    #[test]
    fn written_rows_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("books.parquet");
        let books = vec![book("OL1W", Some(1857)), book("OL2W", None)];

        write_books(&path, &books, 3).unwrap();
        assert_eq!(read_books(&path).unwrap(), books);
        assert!(!path.with_extension("parquet.tmp").exists());
    }

    #[test]
    fn empty_table_is_valid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("books.parquet");
        write_books(&path, &[], 3).unwrap();
        assert!(read_books(&path).unwrap().is_empty());
    }

    #[test]
    fn rewrite_replaces_previous_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("books.parquet");
        write_books(&path, &[book("a", None)], 3).unwrap();
        write_books(&path, &[book("b", None), book("c", None)], 3).unwrap();
        let ids: Vec<_> = read_books(&path).unwrap().into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn stale_tmp_is_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("books.parquet");
        fs::write(path.with_extension("parquet.tmp"), b"half-written").unwrap();
        write_books(&path, &[book("a", Some(1))], 3).unwrap();
        assert_eq!(read_books(&path).unwrap().len(), 1);
    }

    #[test]
    fn garbage_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("books.parquet");
        fs::write(&path, b"not parquet").unwrap();
        assert!(read_books(&path).is_err());
    }

    #[test]
    fn invalid_zstd_level_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("books.parquet");
        let err = write_books(&path, &[], 99).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
