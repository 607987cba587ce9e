use pretty_assertions::assert_eq;
use qail_twoway::entity::{EntityDef, PropDef, PropDefKind};
use qail_twoway::prelude::*;
use qail_twoway::sql::{self, rewrite_for_count, rewrite_for_pagination};

const TEMPLATES: &[&str] = &[
    "select * from emp",
    "select /*%expand*/* from emp e where id = /*id*/0 for update",
    "select * from emp where /*%if name != null*/name like /*name.asPrefix()*/'A%'/*%end*/ order by /*#sort*/",
    "select * from emp where id in /*ids*/(1, 2) and /*%for d in depts*/dept = /*d*/'x' /*%if d_has_next*/or /*%end*//*%end*/",
    "select a from t union all select b from u -- trailing\n",
    "select * from (select id from emp where /*^kind*/'k' = kind) x /*+ hint */",
];

#[test]
fn test_templates_round_trip() {
    for t in TEMPLATES {
        assert_eq!(&qail_twoway::parse(t).unwrap().to_text(), t);
    }
}

#[test]
fn test_render_is_idempotent() {
    let engine = TemplateEngine::new(Dialect::Postgres);
    let ctx = ExprContext::new()
        .with("id", 3)
        .with("ids", vec![1, 2])
        .with("depts", vec!["a", "b"])
        .with("name", "Ann")
        .with("sort", "id");
    for t in TEMPLATES {
        assert_eq!(engine.render(t, &ctx).unwrap(), engine.render(t, &ctx).unwrap());
    }
}

#[test]
fn test_where_elided_when_guard_false() {
    let ctx = ExprContext::new().with("name", Value::Null);
    let sql = qail_twoway::render(
        "select * from emp where /*%if name != null*/name = /*name*/'x'/*%end*/ order by id",
        &ctx,
    )
    .unwrap();
    assert!(!sql.text.contains("where"), "{}", sql.text);
    assert_eq!(sql.text, "select * from emp order by id");
}

#[test]
fn test_pagination_and_count_compose() {
    let template = "select * from emp where dept = /*dept*/'x' order by id";
    let ctx = ExprContext::new().with("dept", "sales");
    let ast = qail_twoway::parse(template).unwrap();
    let plain = sql::render(&ast, &ctx, None).unwrap();

    let paged = sql::render(&rewrite_for_pagination(&ast, Some(5), Some(10)), &ctx, None).unwrap();
    assert_eq!(paged.text, format!("{} limit 5 offset 10", plain.text));
    assert_eq!(paged.values, plain.values);

    let count = sql::render(&rewrite_for_count(&ast), &ctx, None).unwrap();
    assert_eq!(count.text, format!("select count(*) from ({}) t_", plain.text));
}

#[test]
fn test_expand_end_to_end() {
    let ast = qail_twoway::parse("select /*%expand*/* from Address where street = /*street*/'test'").unwrap();
    let expander = |p: &str| vec![format!("{}address_id", p), format!("{}street", p)];
    let ctx = ExprContext::new().with("street", "B");
    let sql = sql::render(&ast, &ctx, Some(&expander)).unwrap();
    assert_eq!(sql.text, "select address_id, street from Address where street = ?");
    assert_eq!(sql.values, vec![TypedValue::of("B")]);
}

#[test]
fn test_expand_entity_columns() {
    let registry = MetaRegistry::new();
    registry.register_entity(EntityDef {
        name: "Address".to_string(),
        table: None,
        properties: vec![
            PropDef::new("addressId", DataType::Int, PropDefKind::IdAssign),
            PropDef::basic("street", DataType::String),
        ],
    });
    let meta = registry.get("Address").unwrap();
    let engine = TemplateEngine::new(Dialect::MySql);
    let sql = engine
        .query("select /*%expand \"a\"*/* from address a where street = /*street*/'test'")
        .bind("street", "B")
        .expand(&meta)
        .render()
        .unwrap();
    assert_eq!(sql.text, "select a.address_id, a.street from address a where street = ?");
}

#[test]
fn test_comparison_with_null_operand() {
    let mut ctx = ExprContext::new();
    ctx.insert_typed("a", TypedValue::null(DataType::Any));
    let err = qail_twoway::evaluate("a > 1", &ctx).unwrap_err();
    assert!(matches!(err, TwoWayError::Evaluation { .. }));
    assert!(err.to_string().contains("left operand"), "{}", err);
}

#[test]
fn test_comparison_not_comparable() {
    let ctx = ExprContext::new().with("a", vec![1, 2]);
    let err = qail_twoway::evaluate("a > 1", &ctx).unwrap_err();
    assert!(err.to_string().contains("not comparable"), "{}", err);
}

#[test]
fn test_unresolved_names_are_null() {
    let value = qail_twoway::evaluate("missing == null", &ExprContext::new()).unwrap();
    assert_eq!(value.value, Value::Bool(true));
}

#[test]
fn test_malformed_templates() {
    assert!(matches!(
        qail_twoway::parse("select * from t where a = 'x").unwrap_err(),
        TwoWayError::Tokenize { .. }
    ));
    assert!(matches!(
        qail_twoway::parse("select * from t where (a = 1").unwrap_err(),
        TwoWayError::Parse { .. }
    ));
    assert!(matches!(
        qail_twoway::parse("select * from t /*%if a*/where a = 1").unwrap_err(),
        TwoWayError::Parse { .. }
    ));
    assert!(matches!(
        qail_twoway::parse("select * from t /*%end*/").unwrap_err(),
        TwoWayError::Parse { .. }
    ));
}

#[test]
fn test_dialect_literals() {
    let template = "select * from t where flag = /*^flag*/true";
    let ctx = ExprContext::new().with("flag", true);
    let pg = TemplateEngine::new(Dialect::Postgres).render(template, &ctx).unwrap();
    let oracle = TemplateEngine::new(Dialect::Oracle).render(template, &ctx).unwrap();
    assert_eq!(pg.text, "select * from t where flag = true");
    assert_eq!(oracle.text, "select * from t where flag = 1");
}
