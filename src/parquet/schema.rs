//! Canonical Arrow schema for ROM records
//!
//! Single source of truth for the 14-column layout shared by staging chunks,
//! direct-mode batches and Parquet export.

use arrow::datatypes::{DataType, Field, Schema};
use std::sync::{Arc, LazyLock};

/// Column names in schema order
pub const COLUMNS: [&str; 14] = [
    "filename",
    "platform",
    "category",
    "game_name",
    "title",
    "release_year",
    "description",
    "rom_name",
    "size",
    "crc",
    "md5",
    "sha1",
    "status",
    "system",
];

static SCHEMA: LazyLock<Arc<Schema>> = LazyLock::new(|| Arc::new(rom_schema()));

/// Build the Arrow schema for ROM records.
///
/// `release_year` is the only nullable column.
pub fn rom_schema() -> Schema {
    let fields = COLUMNS
        .iter()
        .map(|name| match *name {
            "release_year" => Field::new(*name, DataType::Int32, true),
            "size" => Field::new(*name, DataType::Int64, false),
            _ => Field::new(*name, DataType::Utf8, false),
        })
        .collect::<Vec<_>>();
    Schema::new(fields)
}

/// Shared schema reference (for Arrow writer APIs)
pub fn rom_schema_ref() -> Arc<Schema> {
    Arc::clone(&SCHEMA)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_has_14_fields() {
        assert_eq!(rom_schema().fields().len(), 14);
    }

    #[test]
    fn test_schema_field_names() {
        let schema = rom_schema();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, COLUMNS);
    }

    #[test]
    fn test_schema_types_and_nullability() {
        let schema = rom_schema();
        let year = schema.field_with_name("release_year").unwrap();
        assert_eq!(year.data_type(), &DataType::Int32);
        assert!(year.is_nullable());

        let size = schema.field_with_name("size").unwrap();
        assert_eq!(size.data_type(), &DataType::Int64);
        assert!(!size.is_nullable());

        let nullable: Vec<_> = schema
            .fields()
            .iter()
            .filter(|f| f.is_nullable())
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(nullable, vec!["release_year".to_string()]);
    }
}
