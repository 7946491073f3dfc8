//! Classes, constructors, properties and partial types at runtime

use integration_tests::{TestFixture, expr_stmt, method_decl, ok, ret, type_decl};
use lm_interp::Value;
use lm_source::{
    AccessorDecl, Argument, BinaryOp, Block, Body, ConstructorDecl, ConstructorInitializer, Expr, ExprKind, FieldDecl,
    InitializerKind, LocalDeclarator, MemberDecl, MethodDecl, ModelBuilder, PropertyDecl, RefKind, Stmt, StmtKind,
    SymbolDetail, SymbolId, TypeRef,
};
use lm_span::Span;

fn param(builder: &ModelBuilder, method: SymbolId) -> SymbolId {
    match builder.model().params(method) {
        [param, ..] => *param,
        [] => panic!("method has no parameters"),
    }
}

fn ctor_decl(symbol: SymbolId, initializer: Option<ConstructorInitializer>, stmts: Vec<Stmt>) -> MemberDecl {
    MemberDecl::Constructor(ConstructorDecl {
        symbol,
        initializer,
        body: Some(Block::of(stmts)),
        span: Span::detached(),
    })
}

fn field_decl(symbol: SymbolId, initializer: Option<Expr>) -> MemberDecl {
    MemberDecl::Field(FieldDecl {
        symbol,
        initializer,
        span: Span::detached(),
    })
}

fn new_object(ty: SymbolId, ctor: SymbolId, args: Vec<Expr>) -> Expr {
    Expr::new(
        ExprKind::ObjectCreation {
            ty: TypeRef::named(ty),
            ctor: Some(ctor),
            args: args.into_iter().map(Argument::value).collect(),
            initializers: Vec::new(),
        },
        TypeRef::named(ty),
    )
}

fn int_result(value: &Value) -> i64 {
    match value.as_int() {
        Some(int) => int,
        None => panic!("expected an integer, got {value:?}"),
    }
}

/// `Point()`, `Point(x)` and `Point(x, y)` share one constructor table
#[test]
fn test_overloaded_constructors() {
    let mut builder = ModelBuilder::new();
    let int = builder.int();
    let ty = builder.class("App", "Point");
    let x_field = builder.field(ty, "X", int.clone());
    let y_field = builder.field(ty, "Y", int.clone());
    builder.make_public(x_field).make_public(y_field);
    let zero = builder.constructor(ty, &[]);
    let one = builder.constructor(ty, &[("x", int.clone())]);
    let two = builder.constructor(ty, &[("x", int.clone()), ("y", int.clone())]);
    let sum = builder.method(ty, "Sum", &[], int.clone());
    let make = builder.method(ty, "Make", &[("arity", int.clone())], int.clone());
    builder.make_public(sum);
    builder.make_static(make).make_public(make);

    let store = |builder: &ModelBuilder, field: SymbolId, value: Expr| {
        expr_stmt(builder.assign(builder.member(builder.this(ty), field), value))
    };
    let params = |builder: &ModelBuilder, ctor: SymbolId| builder.model().params(ctor).to_vec();
    let one_params = params(&builder, one);
    let two_params = params(&builder, two);
    let ctors = vec![
        ctor_decl(zero, None, Vec::new()),
        ctor_decl(
            one,
            None,
            one_params.iter().map(|param| store(&builder, x_field, builder.name(*param))).collect(),
        ),
        ctor_decl(
            two,
            None,
            two_params
                .iter()
                .zip([x_field, y_field])
                .map(|(param, field)| store(&builder, field, builder.name(*param)))
                .collect(),
        ),
    ];

    let sum_body = vec![ret(builder.binary(
        BinaryOp::Add,
        builder.member(builder.this(ty), x_field),
        builder.member(builder.this(ty), y_field),
        int.clone(),
    ))];
    // Make(arity) builds a point through the matching constructor and sums it
    let arity = param(&builder, make);
    let branch = |builder: &ModelBuilder, wanted: i64, creation: Expr| {
        Stmt::new(StmtKind::If {
            cond: builder.binary(BinaryOp::Eq, builder.name(arity), builder.int_lit(wanted), builder.bool()),
            then: Box::new(ret(builder.call(builder.member(creation, sum), sum, Vec::new()))),
            otherwise: None,
        })
    };
    let make_body = vec![
        branch(&builder, 0, new_object(ty, zero, Vec::new())),
        branch(&builder, 1, new_object(ty, one, vec![builder.int_lit(5)])),
        ret(builder.call(
            builder.member(new_object(ty, two, vec![builder.int_lit(5), builder.int_lit(7)]), sum),
            sum,
            Vec::new(),
        )),
    ];

    let mut members = vec![field_decl(x_field, None), field_decl(y_field, None)];
    members.extend(ctors);
    members.push(method_decl(sum, sum_body));
    members.push(method_decl(make, make_body));
    let mut fixture = TestFixture::new(builder.finish());
    fixture.add_unit("Point.cs", "App", vec![type_decl(ty, members)]);

    let mut session = ok!(fixture.load());
    let table = ok!(session.interp.global("App.Point.__ctor__").map_err(|error| error.to_string()));
    let Some(table) = table.as_table() else {
        panic!("constructors are not a table:\n{}", session.listing());
    };
    assert_eq!(table.borrow().border(), 3);

    for (arity, expected) in [(0, 0), (1, 5), (2, 12)] {
        let value = ok!(session.call("App.Point.Make", vec![Value::Int(arity)]));
        assert_eq!(int_result(&value), expected, "arity {arity}\n{}", session.listing());
    }
}

/// An auto-property stored as a field and a property with accessor bodies
/// read and write the same way from the caller's side
#[test]
fn test_field_and_accessor_properties() {
    let mut builder = ModelBuilder::new();
    let int = builder.int();
    let ty = builder.class("App", "Box");
    let size = builder.auto_property(ty, "Size", int.clone());
    let area = builder.property(ty, "Area", int.clone(), true);
    let backing = builder.field(ty, "area", int.clone());
    let ctor = builder.constructor(ty, &[]);
    let run = builder.method(ty, "Run", &[], int.clone());
    builder.make_public(size).make_public(area);
    builder.make_static(run).make_public(run);
    let (getter, setter) = match &builder.model().symbol(area).detail {
        SymbolDetail::Property {
            getter: Some(getter),
            setter: Some(setter),
            ..
        } => (*getter, *setter),
        _ => panic!("property without accessors"),
    };
    let value = param(&builder, setter);
    let boxed = builder.local(run, "b", TypeRef::named(ty));

    let accessor = |symbol: SymbolId, stmts: Vec<Stmt>| AccessorDecl {
        symbol,
        body: Some(Body::Block(Block::of(stmts))),
        span: Span::detached(),
    };
    let area_decl = MemberDecl::Property(PropertyDecl {
        symbol: area,
        getter: Some(accessor(getter, vec![ret(builder.member(builder.this(ty), backing))])),
        setter: Some(accessor(
            setter,
            vec![expr_stmt(builder.assign(builder.member(builder.this(ty), backing), builder.name(value)))],
        )),
        initializer: None,
        expression_body: None,
        span: Span::detached(),
    });
    let size_decl = MemberDecl::Property(PropertyDecl {
        symbol: size,
        getter: None,
        setter: None,
        initializer: None,
        expression_body: None,
        span: Span::detached(),
    });

    // b = new Box(); b.Size = 3; b.Area = b.Size * 2; b.Size = b.Size + 1; return b.Area * 10 + b.Size;
    let on_box = |builder: &ModelBuilder, member: SymbolId| builder.member(builder.name(boxed), member);
    let run_body = vec![
        Stmt::new(StmtKind::Local(vec![LocalDeclarator {
            symbol: boxed,
            init: Some(new_object(ty, ctor, Vec::new())),
        }])),
        expr_stmt(builder.assign(on_box(&builder, size), builder.int_lit(3))),
        expr_stmt(builder.assign(
            on_box(&builder, area),
            builder.binary(BinaryOp::Mul, on_box(&builder, size), builder.int_lit(2), int.clone()),
        )),
        expr_stmt(builder.assign(
            on_box(&builder, size),
            builder.binary(BinaryOp::Add, on_box(&builder, size), builder.int_lit(1), int.clone()),
        )),
        ret(builder.binary(
            BinaryOp::Add,
            builder.binary(BinaryOp::Mul, on_box(&builder, area), builder.int_lit(10), int.clone()),
            on_box(&builder, size),
            int,
        )),
    ];
    let members = vec![
        field_decl(backing, None),
        size_decl,
        area_decl,
        ctor_decl(ctor, None, Vec::new()),
        method_decl(run, run_body),
    ];
    let mut fixture = TestFixture::new(builder.finish());
    fixture.add_unit("Box.cs", "App", vec![type_decl(ty, members)]);

    let mut session = ok!(fixture.load());
    let listing = session.listing();
    assert!(listing.contains(".Size = 3"), "{listing}");
    assert!(listing.contains("setArea"), "{listing}");
    let value = ok!(session.call("App.Box.Run", Vec::new()));
    assert_eq!(int_result(&value), 64, "{listing}");
}

/// Field initializers of a derived type run before the base constructor
#[test]
fn test_field_init_runs_before_base_constructor() {
    let mut builder = ModelBuilder::new();
    let int = builder.int();
    let string = builder.string();
    let object = builder.object();
    let console = builder.external_class("System", "Console");
    let write_line = builder.method(console, "WriteLine", &[("value", object)], TypeRef::Void);
    builder.make_static(write_line).make_public(write_line);

    let trace = builder.class("App", "Trace");
    let log = builder.method(trace, "Log", &[("message", string)], int.clone());
    builder.make_static(log).make_public(log);
    let message = param(&builder, log);
    let log_body = vec![
        expr_stmt(builder.call(builder.name(write_line), write_line, vec![builder.name(message)])),
        ret(builder.int_lit(1)),
    ];
    let logged = |builder: &ModelBuilder, text: &str| builder.call(builder.name(log), log, vec![builder.string_lit(text)]);

    let shape = builder.class("App", "Shape");
    let shape_ctor = builder.constructor(shape, &[("sides", int.clone())]);
    let square = builder.class("App", "Square");
    builder.set_base(square, TypeRef::named(shape));
    let marker = builder.field(square, "marker", int);
    let square_ctor = builder.constructor(square, &[]);
    let program = builder.class("App", "Program");
    let run = builder.method(program, "Run", &[], TypeRef::Void);
    builder.make_static(run).make_public(run);

    let shape_decl = type_decl(shape, vec![ctor_decl(shape_ctor, None, vec![expr_stmt(logged(&builder, "base"))])]);
    let chained = ConstructorInitializer {
        kind: InitializerKind::Base,
        ctor: shape_ctor,
        args: vec![Argument::value(builder.int_lit(4))],
        span: Span::detached(),
    };
    let square_decl = type_decl(
        square,
        vec![
            field_decl(marker, Some(logged(&builder, "init"))),
            ctor_decl(square_ctor, Some(chained), vec![expr_stmt(logged(&builder, "derived"))]),
        ],
    );
    let program_decl = type_decl(
        program,
        vec![method_decl(run, vec![expr_stmt(new_object(square, square_ctor, Vec::new()))])],
    );
    let trace_decl = type_decl(trace, vec![method_decl(log, log_body)]);
    let mut fixture = TestFixture::new(builder.finish());
    fixture.add_unit("Shapes.cs", "App", vec![trace_decl, shape_decl, square_decl, program_decl]);

    let mut session = ok!(fixture.load());
    ok!(session.call_all("App.Program.Run", Vec::new()));
    assert_eq!(session.printed(), ["init", "base", "derived"], "{}", session.listing());
}

/// A partial class split over two files runs as one type, and the manifest
/// starts `Main`
#[test]
fn test_partial_class_and_entry_point() {
    let mut builder = ModelBuilder::new();
    let int = builder.int();
    let object = builder.object();
    let console = builder.external_class("System", "Console");
    let write_line = builder.method(console, "WriteLine", &[("value", object)], TypeRef::Void);
    builder.make_static(write_line).make_public(write_line);

    let calc = builder.class("App", "Calc");
    let double = builder.method(calc, "Double", &[("value", int.clone())], int.clone());
    let quad = builder.method(calc, "Quad", &[("value", int.clone())], int.clone());
    let main = builder.method(calc, "Main", &[], TypeRef::Void);
    for method in [double, quad, main] {
        builder.make_static(method).make_public(method);
    }
    let double_param = param(&builder, double);
    let quad_param = param(&builder, quad);

    let expr_method = |symbol: SymbolId, body: Expr| {
        MemberDecl::Method(MethodDecl {
            symbol,
            body: Some(Body::Expr(body)),
            span: Span::detached(),
        })
    };
    let doubled = builder.binary(BinaryOp::Mul, builder.name(double_param), builder.int_lit(2), int);
    let twice = builder.call(
        builder.name(double),
        double,
        vec![builder.call(builder.name(double), double, vec![builder.name(quad_param)])],
    );
    let print = |builder: &ModelBuilder, value: Expr| {
        expr_stmt(builder.call(builder.name(write_line), write_line, vec![value]))
    };
    let main_body = vec![
        print(&builder, builder.string_lit("hello")),
        print(&builder, builder.call(builder.name(quad), quad, vec![builder.int_lit(3)])),
    ];
    let mut fixture = TestFixture::new(builder.finish());
    fixture
        .add_unit("src/Calc.cs", "App", vec![type_decl(calc, vec![expr_method(double, doubled)])])
        .add_unit(
            "src/Calc.More.cs",
            "App",
            vec![type_decl(calc, vec![expr_method(quad, twice), method_decl(main, main_body)])],
        );

    let mut session = ok!(fixture.load());
    let emitted: Vec<&str> = session.output.emitted().map(|unit| unit.path.as_str()).collect();
    assert_eq!(emitted, ["src/Calc.cs"]);
    assert_eq!(session.output.entry_point.as_deref(), Some("App.Calc.Main"));

    let value = ok!(session.call("App.Calc.Quad", vec![Value::Int(3)]));
    assert_eq!(int_result(&value), 12, "{}", session.listing());
    ok!(session.run_main());
    assert_eq!(session.printed(), ["hello", "12"], "{}", session.listing());
}

/// A derived type with no constructors still sets up its base's statics
#[test]
fn test_implicit_ctor_runs_base_static_setup() {
    let mut builder = ModelBuilder::new();
    let object = builder.object();
    let console = builder.external_class("System", "Console");
    let write_line = builder.method(console, "WriteLine", &[("value", object)], TypeRef::Void);
    builder.make_static(write_line).make_public(write_line);
    let print = |builder: &ModelBuilder, text: &str| {
        expr_stmt(builder.call(builder.name(write_line), write_line, vec![builder.string_lit(text)]))
    };

    let registry = builder.class("App", "Registry");
    let setup = builder.static_constructor(registry);
    let local = builder.class("App", "Local");
    builder.set_base(local, TypeRef::named(registry));
    let program = builder.class("App", "Program");
    let run = builder.method(program, "Run", &[], TypeRef::Void);
    builder.make_static(run).make_public(run);

    let creation = Expr::new(
        ExprKind::ObjectCreation {
            ty: TypeRef::named(local),
            ctor: None,
            args: Vec::new(),
            initializers: Vec::new(),
        },
        TypeRef::named(local),
    );
    let registry_decl = type_decl(
        registry,
        vec![MemberDecl::Constructor(ConstructorDecl {
            symbol: setup,
            initializer: None,
            body: Some(Block::of(vec![print(&builder, "ready")])),
            span: Span::detached(),
        })],
    );
    let run_body = vec![expr_stmt(creation), print(&builder, "made")];
    let program_decl = type_decl(program, vec![method_decl(run, run_body)]);
    let mut fixture = TestFixture::new(builder.finish());
    fixture.add_unit(
        "Registry.cs",
        "App",
        vec![registry_decl, type_decl(local, Vec::new()), program_decl],
    );

    let mut session = ok!(fixture.load());
    ok!(session.call_all("App.Program.Run", Vec::new()));
    assert_eq!(session.printed(), ["ready", "made"], "{}", session.listing());
}

/// `Pair(this.count, Bump(ref this.count))` passes the field's value from
/// before `Bump` writes it
#[test]
fn test_field_argument_read_before_later_write() {
    let mut builder = ModelBuilder::new();
    let int = builder.int();
    let ty = builder.class("App", "Counter");
    let count = builder.field(ty, "count", int.clone());
    let ctor = builder.constructor(ty, &[]);
    let pair = builder.method(ty, "Pair", &[("a", int.clone()), ("b", int.clone())], int.clone());
    let bump = builder.method_with_refs(ty, "Bump", &[("v", int.clone(), RefKind::Ref)], int.clone());
    let run = builder.method(ty, "Run", &[], int.clone());
    let make = builder.method(ty, "Make", &[], int.clone());
    for method in [pair, bump, make] {
        builder.make_static(method).make_public(method);
    }
    builder.make_public(run);
    let (first, second) = match builder.model().params(pair) {
        [first, second] => (*first, *second),
        _ => panic!("Pair takes two parameters"),
    };
    let value = param(&builder, bump);

    let pair_body = vec![ret(builder.binary(
        BinaryOp::Add,
        builder.binary(BinaryOp::Mul, builder.name(first), builder.int_lit(10), int.clone()),
        builder.name(second),
        int.clone(),
    ))];
    let bump_body = vec![
        expr_stmt(builder.assign(
            builder.name(value),
            builder.binary(BinaryOp::Add, builder.name(value), builder.int_lit(1), int.clone()),
        )),
        ret(builder.name(value)),
    ];
    let bumped = Expr::new(
        ExprKind::Invocation {
            callee: Box::new(builder.name(bump)),
            method: Some(bump),
            args: vec![Argument {
                expr: builder.member(builder.this(ty), count),
                ref_kind: RefKind::Ref,
            }],
            type_args: Vec::new(),
        },
        int.clone(),
    );
    let run_body = vec![ret(builder.call(
        builder.name(pair),
        pair,
        vec![builder.member(builder.this(ty), count), bumped],
    ))];
    let make_body = vec![ret(builder.call(
        builder.member(new_object(ty, ctor, Vec::new()), run),
        run,
        Vec::new(),
    ))];
    let members = vec![
        field_decl(count, Some(builder.int_lit(1))),
        ctor_decl(ctor, None, Vec::new()),
        method_decl(pair, pair_body),
        method_decl(bump, bump_body),
        method_decl(run, run_body),
        method_decl(make, make_body),
    ];
    let mut fixture = TestFixture::new(builder.finish());
    fixture.add_unit("Counter.cs", "App", vec![type_decl(ty, members)]);

    let mut session = ok!(fixture.load());
    let value = ok!(session.call("App.Counter.Make", Vec::new()));
    assert_eq!(int_result(&value), 12, "{}", session.listing());
}
