/// Arrow schema definitions for the law catalog.
pub mod catalog {
    use arrow::datatypes::{DataType, Field, Schema, TimeUnit};

    pub const LAW_REF: &str = "law_ref";
    pub const DESCRIPTION: &str = "description";
    pub const CATEGORY: &str = "category";
    pub const JURISDICTION: &str = "jurisdiction";
    pub const UPDATED_AT: &str = "updated_at";

    /// Schema for catalog exports: one row per law record.
    pub fn law_catalog_schema() -> Schema {
        Schema::new(vec![
            Field::new(LAW_REF, DataType::Utf8, false),
            Field::new(DESCRIPTION, DataType::Utf8, false),
            Field::new(CATEGORY, DataType::Utf8, true),
            Field::new(JURISDICTION, DataType::Utf8, true),
            Field::new(
                UPDATED_AT,
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                true,
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::catalog;

    #[test]
    fn law_catalog_schema_has_expected_fields() {
        let schema = catalog::law_catalog_schema();
        assert_eq!(schema.fields().len(), 5);
        assert!(!schema.field_with_name(catalog::LAW_REF).unwrap().is_nullable());
        assert!(schema.field_with_name(catalog::CATEGORY).unwrap().is_nullable());
    }
}
