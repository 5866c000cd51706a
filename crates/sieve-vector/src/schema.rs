use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

/// Metadata is flat, so it is kept as a JSON object string rather than a struct column.
pub fn build_collection_schema(dim: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, false),
        Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
    ]))
}
