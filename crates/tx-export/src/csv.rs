//! CSV output for record batches

use std::fs::File;
use std::path::Path;

use arrow::csv::WriterBuilder;
use arrow::record_batch::RecordBatch;
use tracing::info;

use crate::ExportError;

/// Write a batch to `path` as CSV with a header row. Nulls become empty fields.
pub fn write_batch(batch: &RecordBatch, path: &Path) -> Result<(), ExportError> {
    let file = File::create(path)?;
    let mut writer = WriterBuilder::new().with_header(true).build(file);
    writer.write(batch)?;
    info!("Wrote {} rows to {}", batch.num_rows(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};

    #[test]
    fn test_writes_header_and_nulls() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("trial_number", DataType::Int64, false),
            Field::new("exclusion_reason", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2])),
                Arc::new(StringArray::from(vec![None, Some("Noise")])),
            ],
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.csv");
        write_batch(&batch, &path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec!["trial_number,exclusion_reason", "1,", "2,Noise"]);
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let batch = RecordBatch::new_empty(Arc::new(Schema::empty()));
        let result = write_batch(&batch, Path::new("/nonexistent/dir/session.csv"));
        assert!(matches!(result, Err(ExportError::Io(_))));
    }
}
