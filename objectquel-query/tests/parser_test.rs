use objectquel_query::ast::{CompareOp, Expr, Range};
use objectquel_query::{Error, parse};

#[test]
fn test_ranges_and_retrieve() {
    let retrieve = parse(
        r#"RANGE OF p IS App\Entity\Product;
           RANGE OF s IS JSON_SOURCE("stock.json", "$.items");
           RETRIEVE UNIQUE (p.name, total = p.price * 2)
           WHERE p.price > 10
           SORT BY p.name DESC
           WINDOW 1 USING WINDOWSIZE 25"#,
    )
    .unwrap();

    assert_eq!(retrieve.ranges.len(), 2);
    let Range::Database(db) = &retrieve.ranges[0] else {
        panic!("expected database range");
    };
    assert_eq!(db.entity.name, "App\\Entity\\Product");
    let Range::JsonSource(json) = &retrieve.ranges[1] else {
        panic!("expected JSON range");
    };
    assert_eq!(json.path, "stock.json");
    assert_eq!(json.filter.as_deref(), Some("$.items"));

    assert!(retrieve.unique);
    let names: Vec<&str> = retrieve.values.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, ["p.name", "total"]);
    assert!(retrieve.values[1].explicit);
    assert!(retrieve.sort[0].descending);
    let window = retrieve.window.unwrap();
    assert_eq!((window.page, window.size, window.offset()), (1, 25, 25));
}

#[test]
fn test_missing_retrieve() {
    let err = parse("RANGE OF p IS Product").unwrap_err();
    assert!(matches!(err, Error::Parser { .. }));
}

#[test]
fn test_duplicate_alias_rejected() {
    let err = parse("RANGE OF p IS Product; RANGE OF p IS Category; RETRIEVE (p)").unwrap_err();
    let Error::Parser { message, .. } = err else {
        panic!("expected parser error");
    };
    assert!(message.contains("Duplicate range alias"));
}

#[test]
fn test_regex_only_with_equality() {
    let ok = parse("RANGE OF p IS Product; RETRIEVE (p) WHERE p.name = /ab.*/i").unwrap();
    let Some(Expr::Compare { op, right, .. }) = &ok.conditions else {
        panic!("expected comparison");
    };
    assert_eq!(*op, CompareOp::Eq);
    assert_eq!(
        **right,
        Expr::RegExp {
            pattern: "ab.*".into(),
            flags: "i".into()
        }
    );

    let err = parse("RANGE OF p IS Product; RETRIEVE (p) WHERE p.name > /ab/").unwrap_err();
    assert!(matches!(err, Error::Parser { .. }));
}

#[test]
fn test_null_comparisons_become_checks() {
    let retrieve =
        parse("RANGE OF p IS Product; RETRIEVE (p) WHERE p.body = NULL AND p.sku <> NULL").unwrap();
    let conditions = retrieve.conditions.unwrap();
    let parts = conditions.conjuncts();
    assert!(matches!(parts[0], Expr::CheckNull(_)));
    assert!(matches!(parts[1], Expr::CheckNotNull(_)));
}

#[test]
fn test_unnamed_projection_uses_source_text() {
    let retrieve = parse("RANGE OF p IS Product; RETRIEVE (count(p))").unwrap();
    assert_eq!(retrieve.values[0].name, "count(p)");
    assert!(matches!(retrieve.values[0].expression, Expr::Count(_)));
}

#[test]
fn test_function_arity_checked() {
    assert!(parse("RANGE OF p IS Product; RETRIEVE (count(p, p))").is_err());
    assert!(parse("RANGE OF p IS Product; RETRIEVE (nosuch(p))").is_err());
}

#[test]
fn test_method_call_chain() {
    let retrieve = parse("RANGE OF p IS Product; RETRIEVE (n = p.name.lower())").unwrap();
    let Expr::MethodCall { target, method, .. } = &retrieve.values[0].expression else {
        panic!("expected method call");
    };
    assert_eq!(target.complete_name(), "p.name");
    assert_eq!(method, "lower");
}

#[test]
fn test_lexer_error_position() {
    let err = parse("RANGE OF p IS Product;\nRETRIEVE (p) # nope").unwrap_err();
    assert!(matches!(err, Error::Lexer { line: 2, .. }));
}
