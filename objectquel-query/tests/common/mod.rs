use objectquel_api::{ColumnDefinition, ColumnType, EntityDefinition, Relation, SchemaMetadata};

pub fn shop_schema() -> SchemaMetadata {
    SchemaMetadata::new()
        .with_entity(
            EntityDefinition::new("App\\Entity\\Product", "products")
                .column(ColumnDefinition::new("id", ColumnType::Integer).primary_key())
                .column(ColumnDefinition::new("name", ColumnType::String))
                .column(ColumnDefinition::new("sku", ColumnType::String))
                .column(ColumnDefinition::new("price", ColumnType::Float))
                .column(
                    ColumnDefinition::new("description", ColumnType::Text)
                        .column("body")
                        .nullable(),
                )
                .column(
                    ColumnDefinition::new("categoryId", ColumnType::Integer)
                        .column("category_id")
                        .nullable(),
                )
                .relation(
                    "category",
                    Relation::many_to_one("App\\Entity\\Category")
                        .inversed_by("products")
                        .relation_column("categoryId"),
                ),
        )
        .with_entity(
            EntityDefinition::new("App\\Entity\\Category", "categories")
                .column(ColumnDefinition::new("id", ColumnType::Integer).primary_key())
                .column(ColumnDefinition::new("title", ColumnType::String))
                .relation(
                    "products",
                    Relation::one_to_many("App\\Entity\\Product", "category"),
                ),
        )
}

pub fn options() -> objectquel_query::QueryOptions {
    objectquel_query::QueryOptions {
        entity_namespaces: vec!["App\\Entity".to_string()],
        ..Default::default()
    }
}
