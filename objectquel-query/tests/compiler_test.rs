mod common;

use common::{options, shop_schema};
use objectquel_api::{Params, Value};
use objectquel_query::{Error, prepare};

fn sql(source: &str) -> String {
    let schema = shop_schema();
    let query = prepare(source, &schema, &options()).unwrap();
    query.sql(&Params::new()).unwrap().sql
}

#[test]
fn test_simple_select() {
    assert_eq!(
        sql("RANGE OF p IS Product; RETRIEVE (p.name) WHERE p.price > 10 SORT BY p.name ASC"),
        "SELECT p.name AS `p.name` FROM products p WHERE p.price > 10 ORDER BY p.name ASC"
    );
}

#[test]
fn test_compilation_is_deterministic() {
    let schema = shop_schema();
    let source = "RANGE OF p IS Product; RANGE OF c IS Category VIA c.products; \
                  RETRIEVE (p, c.title) WHERE p.price > :min AND p.name = \"T*\"";
    let query = prepare(source, &schema, &options()).unwrap();
    let params = Params::new().with("min", 5);
    let first = query.sql(&params).unwrap();
    let second = query.sql(&params).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.params.get("min"), Some(&Value::Int(5)));
}

#[test]
fn test_wildcards_become_like() {
    let out = sql(r#"RANGE OF p IS Product; RETRIEVE (p.name) WHERE p.name = "abc*""#);
    assert!(out.ends_with(r#"WHERE p.name LIKE "abc%""#), "{out}");
    let out = sql(r#"RANGE OF p IS Product; RETRIEVE (p.name) WHERE p.name <> "abc*""#);
    assert!(out.ends_with(r#"WHERE p.name NOT LIKE "abc%""#), "{out}");
}

#[test]
fn test_regex_becomes_regexp() {
    let out = sql("RANGE OF p IS Product; RETRIEVE (p.name) WHERE p.name = /ab.*/");
    assert!(out.ends_with(r#"WHERE p.name REGEXP "ab.*""#), "{out}");
    let out = sql("RANGE OF p IS Product; RETRIEVE (p.name) WHERE p.name <> /ab/i");
    assert!(out.ends_with(r#"WHERE p.name NOT REGEXP "(?i)ab""#), "{out}");
}

#[test]
fn test_mapped_column_names() {
    let out = sql("RANGE OF p IS Product; RETRIEVE (p.description) WHERE p.description IS NULL");
    assert_eq!(
        out,
        "SELECT p.body AS `p.description` FROM products p WHERE p.body IS NULL"
    );
}

#[test]
fn test_entity_projection_expands_columns() {
    let out = sql("RANGE OF c IS Category; RETRIEVE (c)");
    assert_eq!(
        out,
        "SELECT c.id AS `c.id`, c.title AS `c.title` FROM categories c"
    );
}

#[test]
fn test_via_becomes_left_join() {
    let out = sql("RANGE OF c IS Category; RANGE OF p IS Product VIA p.category; RETRIEVE (p.name, c.title)");
    assert_eq!(
        out,
        "SELECT p.name AS `p.name`, c.title AS `c.title` FROM categories c \
         LEFT JOIN products p ON p.category_id = c.id"
    );
}

#[test]
fn test_aggregates_group_plain_projections() {
    let out = sql("RANGE OF p IS Product; RETRIEVE (p.sku, n = count(p))");
    assert_eq!(
        out,
        "SELECT p.sku AS `p.sku`, COUNT(p.id) AS `n` FROM products p GROUP BY p.sku"
    );
}

#[test]
fn test_nullable_sort_key_is_coalesced() {
    let out = sql("RANGE OF p IS Product; RETRIEVE (p.name) SORT BY p.description DESC WINDOW 2 USING WINDOWSIZE 10");
    assert!(
        out.ends_with("ORDER BY COALESCE(p.body, '') DESC LIMIT 20, 10"),
        "{out}"
    );
}

#[test]
fn test_search_expansion() {
    let out = sql(r#"RANGE OF p IS Product; RETRIEVE (p.name) WHERE search(p.name, p.description, "+tea -coffee")"#);
    assert!(
        out.ends_with(
            r#"WHERE ((p.name LIKE "%tea%" OR p.body LIKE "%tea%") AND (p.name NOT LIKE "%coffee%" AND p.body NOT LIKE "%coffee%"))"#
        ),
        "{out}"
    );
}

#[test]
fn test_methods_map_to_sql_functions() {
    let out = sql("RANGE OF p IS Product; RETRIEVE (n = p.name.upper()) WHERE p.sku.length() > 3");
    assert_eq!(
        out,
        "SELECT UPPER(p.name) AS `n` FROM products p WHERE CHAR_LENGTH(p.sku) > 3"
    );
}

#[test]
fn test_unbound_parameter_is_an_error() {
    let schema = shop_schema();
    let query = prepare(
        "RANGE OF p IS Product; RETRIEVE (p.name) WHERE p.price > :min",
        &schema,
        &options(),
    )
    .unwrap();
    assert!(matches!(query.sql(&Params::new()), Err(Error::Quel(_))));
    let plan = query.explain().unwrap();
    assert!(plan.contains("p.price > :min"), "{plan}");
}

#[test]
fn test_semantic_errors() {
    let schema = shop_schema();
    let cases = [
        "RANGE OF p IS Nope; RETRIEVE (p)",
        "RANGE OF p IS Product; RETRIEVE (p.nope)",
        "RANGE OF p IS Product; RETRIEVE (x.name)",
        "RANGE OF p IS Product; RETRIEVE (n = p + 1)",
        "RANGE OF p IS Product; RETRIEVE (n = p.name.reverse())",
    ];
    for source in cases {
        let result = prepare(source, &schema, &options());
        assert!(matches!(result, Err(Error::Quel(_))), "{source}");
    }
}

#[test]
fn test_macro_substitution() {
    let out = sql("RANGE OF p IS Product; RETRIEVE (total = p.price * 2) WHERE total > 50");
    assert_eq!(
        out,
        "SELECT p.price * 2 AS `total` FROM products p WHERE p.price * 2 > 50"
    );
}

fn where_clause(condition: &str) -> String {
    let out = sql(&format!(
        "RANGE OF p IS Product; RETRIEVE (p.name) WHERE {condition}"
    ));
    match out.split_once(" WHERE ") {
        Some((_, clause)) => clause.to_string(),
        None => panic!("no WHERE clause in {out}"),
    }
}

#[test]
fn test_type_checks_on_literals_fold_to_flags() {
    assert_eq!(where_clause(r#"is_empty("")"#), "1");
    assert_eq!(where_clause(r#"is_empty("x")"#), "0");
    assert_eq!(where_clause(r#"is_numeric("12.5")"#), "1");
    assert_eq!(where_clause(r#"is_numeric("abc")"#), "0");
    assert_eq!(where_clause(r#"is_integer("42")"#), "1");
    assert_eq!(where_clause(r#"is_integer("1.5")"#), "0");
    assert_eq!(where_clause(r#"is_float("1.5")"#), "1");
    assert_eq!(where_clause("is_float(3)"), "0");
}

#[test]
fn test_type_checks_on_columns_follow_column_type() {
    assert_eq!(where_clause("is_empty(p.price)"), "(p.price IS NULL OR p.price = 0)");
    assert_eq!(
        where_clause("is_empty(p.description)"),
        r#"(p.body IS NULL OR p.body = "")"#
    );
    assert_eq!(where_clause("is_numeric(p.price)"), "p.price IS NOT NULL");
    assert_eq!(
        where_clause("is_numeric(p.sku)"),
        r#"p.sku REGEXP "^-?[0-9]+(\\.[0-9]+)?$""#
    );
    assert!(
        where_clause("is_integer(p.price)")
            .contains("p.price IS NOT NULL AND p.price = FLOOR(p.price)")
    );
    assert_eq!(where_clause("is_integer(p.id)"), "p.id IS NOT NULL");
    assert_eq!(where_clause("is_float(p.price)"), "p.price IS NOT NULL");
    assert_eq!(where_clause("is_float(p.id)"), "0");
}

#[test]
fn test_ucount_counts_distinct_keys() {
    assert_eq!(
        sql("RANGE OF p IS Product; RETRIEVE (p.sku, n = ucount(p))"),
        "SELECT p.sku AS `p.sku`, COUNT(DISTINCT p.id) AS `n` FROM products p GROUP BY p.sku"
    );
}

#[test]
fn test_in_lists_and_null_checks() {
    assert_eq!(where_clause("p.id IN(1, 2, 3)"), "p.id IN(1, 2, 3)");
    assert_eq!(where_clause("p.description IS NOT NULL"), "p.body IS NOT NULL");
    assert_eq!(where_clause("p.description = NULL"), "p.body IS NULL");
    assert_eq!(where_clause("p.description <> NULL"), "p.body IS NOT NULL");
}

#[test]
fn test_exists_checks_for_a_value() {
    assert_eq!(where_clause("exists(p.description)"), "p.body IS NOT NULL");
}
