//! Integration tests for catalog and settings loading.
//!
//! These tests verify that TOML catalogs and compiler settings load,
//! validate and feed the compiler the way a host application would use them.

use graphfilter::query::{ErrorCode, FilterSettings};
use graphfilter::schema::{Cardinality, Catalog, EntityCatalog, FieldKind, SchemaError};
use graphfilter::{FilterApplicator, FilterNode};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

const SHOP: &str = r#"
    [entities.Product]
    quick_fields = ["name", "sku"]
    search_fields = ["name", "description"]

    [entities.Product.fields]
    id = { kind = "id" }
    name = { kind = "text" }
    sku = { kind = "text" }
    description = { kind = "text", nullable = true }
    price = { kind = "decimal" }
    status = { kind = "text", choices = ["draft", "live", "retired"] }
    created_at = { kind = "timestamp" }
    tags = { kind = { array = "text" } }

    [entities.Product.relations]
    brand = { target = "Brand", cardinality = "one" }
    reviews = { target = "Review", cardinality = "many", back_reference = "product" }

    [entities.Brand.fields]
    id = { kind = "uuid" }
    name = { kind = "text" }

    [entities.Brand.relations]
    products = { target = "Product", cardinality = "many" }

    [entities.Review.fields]
    id = { kind = "id" }
    rating = { kind = "int" }
    verified = { kind = "bool" }

    [entities.Review.relations]
    product = { target = "Product", cardinality = "one" }
"#;

/// Test a full catalog round trip from TOML
#[test]
fn test_catalog_from_toml() {
    let catalog = Catalog::from_str(SHOP).expect("Failed to parse catalog");
    assert!(catalog.validate().is_ok());

    let mut names = catalog.entity_names();
    names.sort_unstable();
    assert_eq!(names, vec!["Brand", "Product", "Review"]);

    let product = catalog.entity("Product").unwrap();
    assert_eq!(product.primary_key, "id");
    assert_eq!(product.get_field("created_at").unwrap().kind, FieldKind::DateTime);
    assert_eq!(
        product.get_field("status").unwrap().choices.as_deref(),
        Some(&["draft".to_string(), "live".to_string(), "retired".to_string()][..])
    );
    assert_eq!(product.quick_search_fields().len(), 2);
    assert_eq!(
        product.get_relation("reviews").unwrap().cardinality,
        Cardinality::ToMany
    );
}

/// Test that validation collects every issue at once
#[test]
fn test_catalog_validation_reports_all_problems() {
    let catalog = Catalog::from_str(
        r#"
        [entities.Order.fields]
        total = { kind = "decimal" }

        [entities.Order.relations]
        lines = { target = "OrderLine", cardinality = "many" }
        total = { target = "Order", cardinality = "one" }
    "#,
    )
    .expect("Failed to parse catalog");

    match catalog.validate() {
        Err(SchemaError::ValidationFailed { count, .. }) => assert_eq!(count, 3),
        other => panic!("Expected ValidationFailed, got {:?}", other),
    }
}

/// Test that unknown top-level keys are rejected
#[test]
fn test_catalog_rejects_unknown_sections() {
    let result = Catalog::from_str("[tables.Product]\n");
    assert!(matches!(result, Err(SchemaError::TomlError { .. })));
}

/// Test environment variable expansion in the catalog
#[test]
fn test_catalog_env_expansion() {
    // SAFETY: Test runs in isolation
    unsafe {
        std::env::set_var("GRAPHFILTER_IT_REVIEW_TARGET", "Review");
    }
    let catalog = Catalog::from_str(
        r#"
        [entities.Product.fields]
        id = { kind = "id" }

        [entities.Product.relations]
        reviews = { target = "${GRAPHFILTER_IT_REVIEW_TARGET}", cardinality = "many" }

        [entities.Review.fields]
        id = { kind = "id" }
    "#,
    )
    .unwrap();
    assert_eq!(
        catalog.entity("Product").unwrap().get_relation("reviews").unwrap().target,
        "Review"
    );
}

/// Test settings loaded from TOML
#[test]
fn test_settings_from_toml() {
    let settings = FilterSettings::from_str(
        r#"
        [limits]
        max_regex_length = 100
        max_filter_depth = 6
        max_clauses = 20

        [schema]
        max_relation_depth = 2

        [features]
        window = true
        full_text = true

        [search]
        config = "simple"
    "#,
    )
    .expect("Failed to parse settings");

    assert_eq!(settings.limits.max_clauses, 20);
    assert_eq!(settings.schema.max_relation_depth, 2);
    assert_eq!(settings.schema.cache_max_size, 1000);
    assert!(settings.features.window);
    assert!(!settings.features.exists);
    assert_eq!(settings.search.config, "simple");
}

/// Test that an empty document yields the defaults
#[test]
fn test_settings_defaults() {
    let settings = FilterSettings::from_str("").unwrap();
    assert_eq!(settings, FilterSettings::default());
    assert_eq!(settings.limits.max_regex_length, 500);
    assert_eq!(settings.limits.max_filter_depth, 10);
    assert_eq!(settings.limits.max_clauses, 50);
    assert_eq!(settings.schema.max_relation_depth, 3);
    assert_eq!(settings.search.config, "english");
}

/// Test that zero limits are rejected
#[test]
fn test_settings_reject_zero_limits() {
    let err = FilterSettings::from_str("[limits]\nmax_clauses = 0\n").unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidConfiguration);

    let err = FilterSettings::from_str("[limits]\nmax_clause = 3\n").unwrap_err();
    assert_eq!(err.code, ErrorCode::ConfigurationLoad);
}

/// Test that a loaded catalog and loaded settings compile filters together
#[test]
fn test_loaded_catalog_compiles() {
    let catalog = Catalog::from_str(SHOP).unwrap();
    let settings = FilterSettings::from_str("[features]\narray = true\n").unwrap();
    let applicator = FilterApplicator::new(Arc::new(catalog), &settings);

    let tree = FilterNode::parse(&json!({
        "status": {"in": ["live"]},
        "tags": {"contains": ["sale"]},
        "brand_rel": {"name": {"istarts_with": "ac"}}
    }))
    .unwrap();
    let compiled = applicator.compile(&tree, "Product").unwrap();

    assert!(compiled.projections.is_empty());
    assert_eq!(
        compiled.predicate.unwrap().to_string(),
        "(status IN ('live') AND tags @> ('sale') AND brand.name ILIKE 'ac%')"
    );
}
