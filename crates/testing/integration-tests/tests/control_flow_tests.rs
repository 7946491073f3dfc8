//! Lowered statements and expressions behave like their source

use integration_tests::{TestFixture, expr_stmt, method_decl, ok, ret, type_decl};
use lm_interp::Value;
use lm_source::{
    Argument, BinaryOp, Block, CatchClause, Expr, ExprKind, FromClause, LocalDeclarator, ModelBuilder, Pattern,
    QueryBody, QueryClause, QueryEnd, QueryExpr, RefKind, Stmt, StmtKind, SwitchLabel, SwitchSection, SymbolId,
    TypeRef, UnaryOp,
};

fn param(builder: &ModelBuilder, method: SymbolId, index: usize) -> SymbolId {
    match builder.model().params(method).get(index) {
        Some(param) => *param,
        None => panic!("method has no parameter {index}"),
    }
}

fn local(symbol: SymbolId, init: Option<Expr>) -> Stmt {
    Stmt::new(StmtKind::Local(vec![LocalDeclarator { symbol, init }]))
}

fn compound(op: BinaryOp, target: Expr, value: Expr) -> Expr {
    let ty = target.ty.clone();
    Expr::new(
        ExprKind::Assignment {
            op: Some(op),
            target: Box::new(target),
            value: Box::new(value),
            method: None,
        },
        ty,
    )
}

fn int_result(value: &Value) -> i64 {
    match value.as_int() {
        Some(int) => int,
        None => panic!("expected an integer, got {value:?}"),
    }
}

/// `for (int i = 0; i < n; i++) { if (i % 2 == 0) continue; total += i; }`
#[test]
fn test_continue_skips_rest_of_iteration() {
    let mut builder = ModelBuilder::new();
    let int = builder.int();
    let boolean = builder.bool();
    let ty = builder.class("App", "Loops");
    let sum_odd = builder.method(ty, "SumOdd", &[("n", int.clone())], int.clone());
    builder.make_static(sum_odd).make_public(sum_odd);
    let n = param(&builder, sum_odd, 0);
    let total = builder.local(sum_odd, "total", int.clone());
    let index = builder.local(sum_odd, "i", int.clone());

    let even = builder.binary(
        BinaryOp::Eq,
        builder.binary(BinaryOp::Mod, builder.name(index), builder.int_lit(2), int.clone()),
        builder.int_lit(0),
        boolean.clone(),
    );
    let step = Expr::new(
        ExprKind::Unary {
            op: UnaryOp::PostIncrement,
            operand: Box::new(builder.name(index)),
            method: None,
        },
        int.clone(),
    );
    let body = Stmt::new(StmtKind::Block(Block::of(vec![
        Stmt::new(StmtKind::If {
            cond: even,
            then: Box::new(Stmt::new(StmtKind::Continue)),
            otherwise: None,
        }),
        expr_stmt(compound(BinaryOp::Add, builder.name(total), builder.name(index))),
    ])));
    let looped = Stmt::new(StmtKind::For {
        decls: vec![LocalDeclarator {
            symbol: index,
            init: Some(builder.int_lit(0)),
        }],
        init: Vec::new(),
        cond: Some(builder.binary(BinaryOp::Lt, builder.name(index), builder.name(n), boolean)),
        step: vec![step],
        body: Box::new(body),
    });
    let stmts = vec![local(total, Some(builder.int_lit(0))), looped, ret(builder.name(total))];
    let mut fixture = TestFixture::new(builder.finish());
    fixture.add_unit("Loops.cs", "App", vec![type_decl(ty, vec![method_decl(sum_odd, stmts)])]);

    let mut session = ok!(fixture.load());
    for limit in [0, 1, 5, 10] {
        let expected: i64 = (0..limit).filter(|index| index % 2 != 0).sum();
        let value = ok!(session.call("App.Loops.SumOdd", vec![Value::Int(limit)]));
        assert_eq!(int_result(&value), expected, "n = {limit}\n{}", session.listing());
    }
}

/// `while (true) { if (turns > 3) break; turns++; if (turns == 2) continue; hits++; }`
#[test]
fn test_break_and_continue_in_while() {
    let mut builder = ModelBuilder::new();
    let int = builder.int();
    let boolean = builder.bool();
    let ty = builder.class("App", "Loops");
    let count = builder.method(ty, "Count", &[], int.clone());
    builder.make_static(count).make_public(count);
    let turns = builder.local(count, "turns", int.clone());
    let hits = builder.local(count, "hits", int.clone());

    let increment = |builder: &ModelBuilder, symbol: SymbolId| {
        expr_stmt(Expr::new(
            ExprKind::Unary {
                op: UnaryOp::PostIncrement,
                operand: Box::new(builder.name(symbol)),
                method: None,
            },
            builder.int(),
        ))
    };
    let body = Stmt::new(StmtKind::Block(Block::of(vec![
        Stmt::new(StmtKind::If {
            cond: builder.binary(BinaryOp::Gt, builder.name(turns), builder.int_lit(3), boolean.clone()),
            then: Box::new(Stmt::new(StmtKind::Break)),
            otherwise: None,
        }),
        increment(&builder, turns),
        Stmt::new(StmtKind::If {
            cond: builder.binary(BinaryOp::Eq, builder.name(turns), builder.int_lit(2), boolean),
            then: Box::new(Stmt::new(StmtKind::Continue)),
            otherwise: None,
        }),
        increment(&builder, hits),
    ])));
    let stmts = vec![
        local(turns, Some(builder.int_lit(0))),
        local(hits, Some(builder.int_lit(0))),
        Stmt::new(StmtKind::While {
            cond: builder.bool_lit(true),
            body: Box::new(body),
        }),
        ret(builder.binary(
            BinaryOp::Add,
            builder.binary(BinaryOp::Mul, builder.name(turns), builder.int_lit(10), int.clone()),
            builder.name(hits),
            int,
        )),
    ];
    let mut fixture = TestFixture::new(builder.finish());
    fixture.add_unit("Loops.cs", "App", vec![type_decl(ty, vec![method_decl(count, stmts)])]);

    let mut session = ok!(fixture.load());
    // turns runs 1..=4 and skips the hit for 2
    let value = ok!(session.call("App.Loops.Count", Vec::new()));
    assert_eq!(int_result(&value), 43, "{}", session.listing());
}

#[test]
fn test_conditional_keeps_falsy_branch_values() {
    let mut builder = ModelBuilder::new();
    let boolean = builder.bool();
    let string = builder.string();
    let ty = builder.class("App", "Pick");
    let flip = builder.method(ty, "Flip", &[], boolean.clone());
    let choose = builder.method(ty, "Choose", &[("flag", boolean.clone())], string.clone());
    builder.make_static(flip).make_public(flip);
    builder.make_static(choose).make_public(choose);
    let flag = param(&builder, choose, 0);

    let flipped = Expr::new(
        ExprKind::Conditional {
            cond: Box::new(builder.bool_lit(true)),
            when_true: Box::new(builder.bool_lit(false)),
            when_false: Box::new(builder.bool_lit(true)),
        },
        boolean,
    );
    let chosen = Expr::new(
        ExprKind::Conditional {
            cond: Box::new(builder.name(flag)),
            when_true: Box::new(builder.null_lit(string.clone())),
            when_false: Box::new(builder.string_lit("none")),
        },
        string,
    );
    let members = vec![method_decl(flip, vec![ret(flipped)]), method_decl(choose, vec![ret(chosen)])];
    let mut fixture = TestFixture::new(builder.finish());
    fixture.add_unit("Pick.cs", "App", vec![type_decl(ty, members)]);

    let mut session = ok!(fixture.load());
    assert_eq!(ok!(session.call("App.Pick.Flip", Vec::new())), Value::Bool(false));
    assert_eq!(ok!(session.call("App.Pick.Choose", vec![Value::Bool(true)])), Value::Nil);
    assert_eq!(ok!(session.call("App.Pick.Choose", vec![Value::Bool(false)])), Value::from("none"));
}

/// `TryParse(out int value)` and `Bump(ref int x)` write back to the caller
#[test]
fn test_ref_and_out_arguments_write_back() {
    let mut builder = ModelBuilder::new();
    let int = builder.int();
    let boolean = builder.bool();
    let ty = builder.class("App", "Refs");
    let parse = builder.method_with_refs(ty, "TryParse", &[("value", int.clone(), RefKind::Out)], boolean.clone());
    let bump = builder.method_with_refs(ty, "Bump", &[("x", int.clone(), RefKind::Ref)], TypeRef::Void);
    let run = builder.method(ty, "Run", &[], int.clone());
    for method in [parse, bump, run] {
        builder.make_static(method).make_public(method);
    }
    let value = param(&builder, parse, 0);
    let x = param(&builder, bump, 0);
    let result = builder.local(run, "result", int.clone());
    let parsed = builder.local(run, "ok", boolean.clone());

    let by_ref = |builder: &ModelBuilder, method: SymbolId, symbol: SymbolId, ref_kind: RefKind, ty: TypeRef| {
        Expr::new(
            ExprKind::Invocation {
                callee: Box::new(builder.name(method)),
                method: Some(method),
                args: vec![Argument {
                    expr: builder.name(symbol),
                    ref_kind,
                }],
                type_args: Vec::new(),
            },
            ty,
        )
    };
    let parse_body = vec![
        expr_stmt(builder.assign(builder.name(value), builder.int_lit(7))),
        ret(builder.bool_lit(true)),
    ];
    let bump_body = vec![expr_stmt(builder.assign(
        builder.name(x),
        builder.binary(BinaryOp::Add, builder.name(x), builder.int_lit(1), int.clone()),
    ))];
    let run_body = vec![
        local(result, None),
        local(parsed, Some(by_ref(&builder, parse, result, RefKind::Out, boolean))),
        expr_stmt(by_ref(&builder, bump, result, RefKind::Ref, TypeRef::Void)),
        expr_stmt(by_ref(&builder, bump, result, RefKind::Ref, TypeRef::Void)),
        ret(Expr::new(
            ExprKind::Conditional {
                cond: Box::new(builder.name(parsed)),
                when_true: Box::new(builder.name(result)),
                when_false: Box::new(builder.int_lit(-1)),
            },
            int,
        )),
    ];
    let members = vec![
        method_decl(parse, parse_body),
        method_decl(bump, bump_body),
        method_decl(run, run_body),
    ];
    let mut fixture = TestFixture::new(builder.finish());
    fixture.add_unit("Refs.cs", "App", vec![type_decl(ty, members)]);

    let mut session = ok!(fixture.load());
    let returned = ok!(session.call("App.Refs.Run", Vec::new()));
    assert_eq!(int_result(&returned), 9, "{}", session.listing());
}

/// `try { if (fail) throw new Exception("boom"); caught = 1; }
/// catch (Exception e) { caught = 2; } finally { caught *= 10; }`
#[test]
fn test_try_catch_finally() {
    let mut builder = ModelBuilder::new();
    let int = builder.int();
    let boolean = builder.bool();
    let string = builder.string();
    let exception = builder.external_class("System", "Exception");
    let exception_ctor = builder.constructor(exception, &[("message", string)]);
    let ty = builder.class("App", "Guard");
    let guard = builder.method(ty, "Run", &[("fail", boolean)], int.clone());
    builder.make_static(guard).make_public(guard);
    let fail = param(&builder, guard, 0);
    let caught = builder.local(guard, "caught", int.clone());
    let error = builder.local(guard, "e", TypeRef::named(exception));

    let thrown = Expr::new(
        ExprKind::ObjectCreation {
            ty: TypeRef::named(exception),
            ctor: Some(exception_ctor),
            args: vec![Argument::value(builder.string_lit("boom"))],
            initializers: Vec::new(),
        },
        TypeRef::named(exception),
    );
    let set = |builder: &ModelBuilder, value: i64| expr_stmt(builder.assign(builder.name(caught), builder.int_lit(value)));
    let attempt = Stmt::new(StmtKind::Try {
        block: Block::of(vec![
            Stmt::new(StmtKind::If {
                cond: builder.name(fail),
                then: Box::new(Stmt::new(StmtKind::Throw(Some(thrown)))),
                otherwise: None,
            }),
            set(&builder, 1),
        ]),
        catches: vec![CatchClause {
            ty: Some(TypeRef::named(exception)),
            var: Some(error),
            filter: None,
            block: Block::of(vec![set(&builder, 2)]),
        }],
        finally: Some(Block::of(vec![expr_stmt(compound(
            BinaryOp::Mul,
            builder.name(caught),
            builder.int_lit(10),
        ))])),
    });
    let stmts = vec![local(caught, Some(builder.int_lit(0))), attempt, ret(builder.name(caught))];
    let mut fixture = TestFixture::new(builder.finish());
    fixture.add_unit("Guard.cs", "App", vec![type_decl(ty, vec![method_decl(guard, stmts)])]);

    let mut session = ok!(fixture.load());
    let passed = ok!(session.call("App.Guard.Run", vec![Value::Bool(false)]));
    let failed = ok!(session.call("App.Guard.Run", vec![Value::Bool(true)]));
    assert_eq!(int_result(&passed), 10, "{}", session.listing());
    assert_eq!(int_result(&failed), 20, "{}", session.listing());
}

fn int_array(builder: &ModelBuilder, items: &[i64]) -> Expr {
    let int = builder.int();
    Expr::new(
        ExprKind::ArrayCreation {
            elem: int.clone(),
            items: items.iter().map(|item| builder.int_lit(*item)).collect(),
        },
        TypeRef::Array(Box::new(int)),
    )
}

fn sequence(value: &Value) -> Vec<i64> {
    let Some(table) = value.as_table() else {
        panic!("expected a sequence, got {value:?}");
    };
    table.borrow().sequence_items().iter().map(int_result).collect()
}

/// `from x in {1, 2} from y in {10, 20} [from z in {100, 200}] select x + y [+ z]`
#[test]
fn test_query_with_several_from_clauses() {
    let mut builder = ModelBuilder::new();
    let int = builder.int();
    let ty = builder.class("App", "Queries");
    let items = builder.enumerable(int.clone());
    let pairs = builder.method(ty, "Pairs", &[], items.clone());
    let triples = builder.method(ty, "Triples", &[], items.clone());
    builder.make_static(pairs).make_public(pairs);
    builder.make_static(triples).make_public(triples);

    let query = |builder: &mut ModelBuilder, depth: usize| {
        let sources: [&[i64]; 3] = [&[1, 2], &[10, 20], &[100, 200]];
        let vars: Vec<SymbolId> = ["x", "y", "z"]
            .iter()
            .take(depth)
            .map(|name| builder.range_var(name, int.clone()))
            .collect();
        let sum = vars
            .iter()
            .skip(1)
            .fold(builder.name(vars[0]), |acc, var| builder.binary(BinaryOp::Add, acc, builder.name(*var), int.clone()));
        let clauses = vars
            .iter()
            .zip(sources)
            .skip(1)
            .map(|(var, source)| {
                QueryClause::From(FromClause {
                    var: *var,
                    expr: int_array(builder, source),
                })
            })
            .collect();
        Expr::new(
            ExprKind::Query(Box::new(QueryExpr {
                from: FromClause {
                    var: vars[0],
                    expr: int_array(builder, sources[0]),
                },
                body: QueryBody {
                    clauses,
                    end: QueryEnd::Select(sum),
                    continuation: None,
                },
            })),
            items.clone(),
        )
    };
    let two = query(&mut builder, 2);
    let three = query(&mut builder, 3);
    let members = vec![method_decl(pairs, vec![ret(two)]), method_decl(triples, vec![ret(three)])];
    let mut fixture = TestFixture::new(builder.finish());
    fixture.add_unit("Queries.cs", "App", vec![type_decl(ty, members)]);

    let mut session = ok!(fixture.load());
    let pair_sums = ok!(session.call("App.Queries.Pairs", Vec::new()));
    assert_eq!(sequence(&pair_sums), vec![11, 21, 12, 22], "{}", session.listing());
    let triple_sums = ok!(session.call("App.Queries.Triples", Vec::new()));
    assert_eq!(
        sequence(&triple_sums),
        vec![111, 211, 121, 221, 112, 212, 122, 222],
        "{}",
        session.listing()
    );
}

/// `switch (subject) { case string s when Check(s, out n): return n; default: return 0; }`
/// only calls `Check` for strings
#[test]
fn test_switch_guard_runs_after_pattern_matches() {
    let mut builder = ModelBuilder::new();
    let int = builder.int();
    let boolean = builder.bool();
    let string = builder.string();
    let object = builder.object();
    let console = builder.external_class("System", "Console");
    let write_line = builder.method(console, "WriteLine", &[("value", object.clone())], TypeRef::Void);
    builder.make_static(write_line).make_public(write_line);

    let ty = builder.class("App", "Guards");
    let check = builder.method_with_refs(
        ty,
        "Check",
        &[("value", object.clone(), RefKind::None), ("n", int.clone(), RefKind::Out)],
        boolean.clone(),
    );
    let classify = builder.method(ty, "Classify", &[("subject", object)], int.clone());
    builder.make_static(check).make_public(check);
    builder.make_static(classify).make_public(classify);
    let out_n = param(&builder, check, 1);
    let subject = param(&builder, classify, 0);
    let text = builder.local(classify, "s", string.clone());
    let found = builder.local(classify, "n", int.clone());

    let check_body = vec![
        expr_stmt(builder.call(builder.name(write_line), write_line, vec![builder.string_lit("checked")])),
        expr_stmt(builder.assign(builder.name(out_n), builder.int_lit(5))),
        ret(builder.bool_lit(true)),
    ];
    let guard = Expr::new(
        ExprKind::Invocation {
            callee: Box::new(builder.name(check)),
            method: Some(check),
            args: vec![
                Argument::value(builder.name(text)),
                Argument {
                    expr: builder.name(found),
                    ref_kind: RefKind::Out,
                },
            ],
            type_args: Vec::new(),
        },
        boolean,
    );
    let switch = Stmt::new(StmtKind::Switch {
        subject: builder.name(subject),
        sections: vec![
            SwitchSection {
                labels: vec![SwitchLabel::Pattern {
                    pattern: Pattern::Declaration { ty: string, var: text },
                    when: Some(guard),
                }],
                stmts: vec![ret(builder.name(found))],
            },
            SwitchSection {
                labels: vec![SwitchLabel::Default],
                stmts: vec![ret(builder.int_lit(0))],
            },
        ],
    });
    let classify_body = vec![local(found, None), switch];
    let members = vec![method_decl(check, check_body), method_decl(classify, classify_body)];
    let mut fixture = TestFixture::new(builder.finish());
    fixture.add_unit("Guards.cs", "App", vec![type_decl(ty, members)]);

    let mut session = ok!(fixture.load());
    let skipped = ok!(session.call("App.Guards.Classify", vec![Value::Int(7)]));
    assert_eq!(int_result(&skipped), 0, "{}", session.listing());
    assert!(session.printed().is_empty(), "{}", session.listing());

    let matched = ok!(session.call("App.Guards.Classify", vec![Value::str("seven")]));
    assert_eq!(int_result(&matched), 5, "{}", session.listing());
    assert_eq!(session.printed(), ["checked"], "{}", session.listing());
}
