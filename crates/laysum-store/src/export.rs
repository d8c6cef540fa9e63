//! Flatten annotations into an Arrow table for admin export.

use std::sync::Arc;

use arrow::array::{ArrayRef, StringBuilder, UInt8Builder, UInt64Builder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;

use laysum_core::{AnnotationRecord, Aspect};

use crate::StoreError;

/// Export schema: the four scores repeated on every row, then one label
/// per row. Unlabelled annotations get a single row with null label columns.
pub fn export_schema() -> Arc<Schema> {
    let mut fields = vec![Field::new("text_id", DataType::Utf8, false)];
    fields.extend(
        Aspect::ALL
            .iter()
            .map(|a| Field::new(a.name(), DataType::UInt8, false)),
    );
    fields.extend([
        Field::new("label_type", DataType::Utf8, true),
        Field::new("label_text", DataType::Utf8, true),
        Field::new("corrected_text", DataType::Utf8, true),
        Field::new("start_index", DataType::UInt64, true),
        Field::new("end_index", DataType::UInt64, true),
    ]);
    Arc::new(Schema::new(fields))
}

pub fn annotations_to_batch(records: &[AnnotationRecord]) -> Result<RecordBatch, StoreError> {
    let mut text_id = StringBuilder::new();
    let mut scores: Vec<UInt8Builder> = Aspect::ALL.iter().map(|_| UInt8Builder::new()).collect();
    let mut label_type = StringBuilder::new();
    let mut label_text = StringBuilder::new();
    let mut corrected = StringBuilder::new();
    let mut start = UInt64Builder::new();
    let mut end = UInt64Builder::new();

    for record in records {
        let rows = record.labels.len().max(1);
        for row in 0..rows {
            text_id.append_value(&record.document_id);
            for (builder, aspect) in scores.iter_mut().zip(Aspect::ALL) {
                builder.append_value(record.scores.get(aspect));
            }
            match record.labels.get(row) {
                Some(label) => {
                    label_type.append_value(label.category.display_name());
                    label_text.append_value(&label.original_text);
                    corrected.append_option(label.corrected_text.as_deref());
                    start.append_value(label.start as u64);
                    end.append_value(label.end as u64);
                }
                None => {
                    label_type.append_null();
                    label_text.append_null();
                    corrected.append_null();
                    start.append_null();
                    end.append_null();
                }
            }
        }
    }

    let mut columns: Vec<ArrayRef> = vec![Arc::new(text_id.finish())];
    columns.extend(
        scores
            .iter_mut()
            .map(|b| Arc::new(b.finish()) as ArrayRef),
    );
    columns.extend([
        Arc::new(label_type.finish()) as ArrayRef,
        Arc::new(label_text.finish()),
        Arc::new(corrected.finish()),
        Arc::new(start.finish()),
        Arc::new(end.finish()),
    ]);
    Ok(RecordBatch::try_new(export_schema(), columns)?)
}
