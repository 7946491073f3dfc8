use crate::{LowerOptions, ProgramFacts, UnitOutput, lower_unit};
use lm_override::OverrideProvider;
use lm_source::{
    AccessorDecl, Argument, BinaryOp, Block, Body, CompilationUnit, ConstructorDecl, ConstructorInitializer,
    EnumMemberDecl, Expr, ExprKind, FieldDecl, InitializerKind, LocalDeclarator, MemberDecl, MethodDecl, ModelBuilder,
    NamespaceDecl, NamespaceMember, PropertyDecl, RefKind, SemanticModel, Stmt, StmtKind, SymbolDetail, SymbolId,
    TypeDecl, TypeRef, UnaryOp,
};
use lm_span::{FileId, Span};

fn type_decl(symbol: SymbolId, members: Vec<MemberDecl>) -> TypeDecl {
    TypeDecl {
        symbol,
        members,
        attributes: Vec::new(),
        span: Span::detached(),
    }
}

fn method_decl(symbol: SymbolId, stmts: Vec<Stmt>) -> MemberDecl {
    MemberDecl::Method(MethodDecl {
        symbol,
        body: Some(Body::Block(Block::of(stmts))),
        span: Span::detached(),
    })
}

fn expr_stmt(expr: Expr) -> Stmt {
    Stmt::new(StmtKind::Expr(expr))
}

fn unit_in(namespace: &str, types: Vec<TypeDecl>) -> CompilationUnit {
    CompilationUnit {
        file: FileId::new(0),
        path: "Program.cs".to_owned(),
        text: None,
        members: vec![NamespaceMember::Namespace(NamespaceDecl {
            name: namespace.to_owned(),
            members: types.into_iter().map(NamespaceMember::Type).collect(),
            span: Span::detached(),
        })],
    }
}

fn lower_with(model: &SemanticModel, unit: CompilationUnit, options: &LowerOptions) -> (UnitOutput, String) {
    let units = vec![unit];
    let facts = ProgramFacts::collect(model, &units);
    let overrides = OverrideProvider::new();
    let output = match lower_unit(&units[0], model, &overrides, options, &facts) {
        Ok(output) => output,
        Err(error) => panic!("lowering failed: {error}"),
    };
    let text = lm_render::render(&output.chunk, 4);
    (output, text)
}

fn lower(model: &SemanticModel, unit: CompilationUnit) -> String {
    lower_with(model, unit, &LowerOptions::default()).1
}

#[test]
fn test_namespace_wraps_type_registration() {
    let mut builder = ModelBuilder::new();
    let ty = builder.class("Game.Core", "Empty");
    let model = builder.finish();

    let text = lower(&model, unit_in("Game.Core", vec![type_decl(ty, Vec::new())]));
    expect_test::expect![[r#"
        System.namespace("Game.Core", function (namespace)
            namespace.class("Empty", function (namespace)
                return {}
            end)
        end)
    "#]]
    .assert_eq(&text);
}

#[test]
fn test_instance_init_runs_only_in_non_chaining_ctor() {
    let mut builder = ModelBuilder::new();
    let int = builder.int();
    let ty = builder.class("App", "Counter");
    let count = builder.field(ty, "count", int.clone());
    let make = builder.method(ty, "Make", &[], int.clone());
    builder.make_static(make);
    let zero = builder.constructor(ty, &[]);
    let one = builder.constructor(ty, &[("n", int.clone())]);
    let initial = builder.call(builder.name(make), make, Vec::new());
    let chained = ConstructorInitializer {
        kind: InitializerKind::This,
        ctor: one,
        args: vec![Argument::value(builder.int_lit(1))],
        span: Span::detached(),
    };
    let body = Body::Expr(builder.int_lit(0));
    let model = builder.finish();

    let decl = type_decl(
        ty,
        vec![
            MemberDecl::Field(FieldDecl {
                symbol: count,
                initializer: Some(initial),
                span: Span::detached(),
            }),
            MemberDecl::Method(MethodDecl {
                symbol: make,
                body: Some(body),
                span: Span::detached(),
            }),
            MemberDecl::Constructor(ConstructorDecl {
                symbol: zero,
                initializer: Some(chained),
                body: Some(Block::default()),
                span: Span::detached(),
            }),
            MemberDecl::Constructor(ConstructorDecl {
                symbol: one,
                initializer: None,
                body: Some(Block::default()),
                span: Span::detached(),
            }),
        ],
    );
    let text = lower(&model, unit_in("App", vec![decl]));
    expect_test::expect![[r#"
        System.namespace("App", function (namespace)
            namespace.class("Counter", function (namespace)
                local Make, __init__, __ctor1__, __ctor2__
                __init__ = function (this)
                    this.count = Make()
                end
                __ctor1__ = function (this)
                    __ctor2__(this, 1)
                end
                __ctor2__ = function (this, n)
                    __init__(this)
                end
                Make = function ()
                    return 0
                end
                return { __ctor__ = { __ctor1__, __ctor2__ } }
            end)
        end)
    "#]]
    .assert_eq(&text);
}

#[test]
fn test_struct_gets_default_and_clone() {
    let mut builder = ModelBuilder::new();
    let int = builder.int();
    let ty = builder.struct_type("Geo", "Point");
    let x = builder.field(ty, "X", int.clone());
    let y = builder.field(ty, "Y", int);
    builder.make_public(x).make_public(y);
    let model = builder.finish();

    let field = |symbol| {
        MemberDecl::Field(FieldDecl {
            symbol,
            initializer: None,
            span: Span::detached(),
        })
    };
    let text = lower(&model, unit_in("Geo", vec![type_decl(ty, vec![field(x), field(y)])]));
    assert!(text.contains("namespace.struct(\"Point\""), "{text}");
    assert!(text.contains("X = 0"), "{text}");
    assert!(text.contains("__default__ = function ()"), "{text}");
    assert!(text.contains("return setmetatable({ X = this.X, Y = this.Y }, getmetatable(this))"), "{text}");
}

#[test]
fn test_enum_is_a_table_and_exported() {
    let mut builder = ModelBuilder::new();
    let ty = builder.enum_type("App", "Color");
    let red = builder.enum_member(ty, "Red", 0);
    let blue = builder.enum_member(ty, "Blue", 4);
    let model = builder.finish();

    let member = |symbol| {
        MemberDecl::EnumMember(EnumMemberDecl {
            symbol,
            span: Span::detached(),
        })
    };
    let (output, text) = lower_with(
        &model,
        unit_in("App", vec![type_decl(ty, vec![member(red), member(blue)])]),
        &LowerOptions::default(),
    );
    assert!(text.contains("namespace.enum(\"Color\", function (namespace)"), "{text}");
    assert!(text.contains("return { Red = 0, Blue = 4 }"), "{text}");
    assert_eq!(output.exports, vec!["App.Color".to_owned()]);
    assert_eq!(output.type_count, 1);
}

#[test]
fn test_increment_evaluates_receiver_once() {
    let mut builder = ModelBuilder::new();
    let int = builder.int();
    let ty = builder.class("App", "Box");
    let count = builder.field(ty, "count", int.clone());
    builder.make_public(count);
    let get = builder.method(ty, "Get", &[], TypeRef::named(ty));
    builder.make_public(get);
    let bump = builder.method(ty, "Bump", &[], TypeRef::Void);
    builder.make_public(bump);
    let receiver = builder.call(builder.member(builder.this(ty), get), get, Vec::new());
    let step = Expr::new(
        ExprKind::Unary {
            op: UnaryOp::PostIncrement,
            operand: Box::new(builder.member(receiver, count)),
            method: None,
        },
        int,
    );
    let get_body = Stmt::new(StmtKind::Return(Some(builder.this(ty))));
    let model = builder.finish();

    let decl = type_decl(ty, vec![method_decl(get, vec![get_body]), method_decl(bump, vec![expr_stmt(step)])]);
    let text = lower(&model, unit_in("App", vec![decl]));
    assert_eq!(text.matches(":Get()").count(), 1, "{text}");
    assert!(text.contains(".count = "), "{text}");
    assert!(text.contains(".count + 1"), "{text}");
}

#[test]
fn test_out_argument_becomes_multiple_assignment() {
    let mut builder = ModelBuilder::new();
    let int = builder.int();
    let boolean = builder.bool();
    let ty = builder.class("App", "Parser");
    let parse = builder.method_with_refs(ty, "TryParse", &[("value", int.clone(), RefKind::Out)], boolean.clone());
    builder.make_static(parse).make_public(parse);
    let run = builder.method(ty, "Run", &[], TypeRef::Void);
    builder.make_static(run).make_public(run);
    let result = builder.local(run, "result", int.clone());
    let ok = builder.local(run, "ok", boolean);
    let call = Expr::new(
        ExprKind::Invocation {
            callee: Box::new(builder.name(parse)),
            method: Some(parse),
            args: vec![Argument {
                expr: builder.name(result),
                ref_kind: RefKind::Out,
            }],
            type_args: Vec::new(),
        },
        builder.bool(),
    );
    let parse_body = vec![
        expr_stmt(builder.assign(builder.name(model_param(&builder, parse)), builder.int_lit(7))),
        Stmt::new(StmtKind::Return(Some(builder.bool_lit(true)))),
    ];
    let run_body = vec![
        Stmt::new(StmtKind::Local(vec![LocalDeclarator {
            symbol: result,
            init: None,
        }])),
        Stmt::new(StmtKind::Local(vec![LocalDeclarator {
            symbol: ok,
            init: Some(call),
        }])),
    ];
    let model = builder.finish();

    let decl = type_decl(ty, vec![method_decl(parse, parse_body), method_decl(run, run_body)]);
    let text = lower(&model, unit_in("App", vec![decl]));
    // the callee hands the out value back after its own result
    assert!(text.contains("return true, value"), "{text}");
    assert!(text.contains(", result = TryParse()"), "{text}");
}

fn model_param(builder: &ModelBuilder, method: SymbolId) -> SymbolId {
    match builder.model().params(method) {
        [param, ..] => *param,
        [] => panic!("method has no parameters"),
    }
}

#[test]
fn test_continue_is_emulated_with_a_flag() {
    let mut builder = ModelBuilder::new();
    let boolean = builder.bool();
    let ty = builder.class("App", "Looper");
    let spin = builder.method(ty, "Spin", &[("go", boolean.clone())], TypeRef::Void);
    builder.make_static(spin).make_public(spin);
    let go = model_param(&builder, spin);
    let body = Stmt::new(StmtKind::Block(Block::of(vec![Stmt::new(StmtKind::If {
        cond: builder.name(go),
        then: Box::new(Stmt::new(StmtKind::Continue)),
        otherwise: Some(Box::new(Stmt::new(StmtKind::Break))),
    })])));
    let looped = Stmt::new(StmtKind::While {
        cond: builder.bool_lit(true),
        body: Box::new(body),
    });
    let model = builder.finish();

    let text = lower(&model, unit_in("App", vec![type_decl(ty, vec![method_decl(spin, vec![looped])])]));
    assert!(text.contains("local continue\n"), "{text}");
    assert!(text.contains("continue = true"), "{text}");
    assert!(text.contains("until true"), "{text}");
    assert!(text.contains("if not continue then"), "{text}");
    assert!(!text.contains("goto"), "{text}");
}

#[test]
fn test_conditional_with_falsy_branch_uses_temporary() {
    let mut builder = ModelBuilder::new();
    let string = builder.string();
    let boolean = builder.bool();
    let ty = builder.class("App", "Pick");
    let pick = builder.method(ty, "Choose", &[("flag", boolean.clone())], string.clone());
    let safe = builder.method(ty, "Label", &[("flag", boolean)], string.clone());
    builder.make_static(pick).make_public(pick);
    builder.make_static(safe).make_public(safe);
    let conditional = |builder: &ModelBuilder, method, when_true: Expr| {
        let flag = model_param(builder, method);
        Expr::new(
            ExprKind::Conditional {
                cond: Box::new(builder.name(flag)),
                when_true: Box::new(when_true),
                when_false: Box::new(builder.string_lit("none")),
            },
            builder.string(),
        )
    };
    let nullable = conditional(&builder, pick, builder.null_lit(string));
    let chained = conditional(&builder, safe, builder.string_lit("some"));
    let model = builder.finish();

    let decl = type_decl(
        ty,
        vec![
            method_decl(pick, vec![Stmt::new(StmtKind::Return(Some(nullable)))]),
            method_decl(safe, vec![Stmt::new(StmtKind::Return(Some(chained)))]),
        ],
    );
    let text = lower(&model, unit_in("App", vec![decl]));
    assert!(text.contains("return flag and \"some\" or \"none\""), "{text}");
    assert!(!text.contains("flag and nil"), "{text}");
    assert!(text.contains("if flag then"), "{text}");
}

#[test]
fn test_base_ctor_runs_after_field_init() {
    let mut builder = ModelBuilder::new();
    let int = builder.int();
    let base = builder.class("App", "Shape");
    let base_ctor = builder.constructor(base, &[("sides", int.clone())]);
    let derived = builder.class("App", "Square");
    builder.set_base(derived, TypeRef::named(base));
    let size = builder.field(derived, "size", int.clone());
    let derived_ctor = builder.constructor(derived, &[]);
    let init = builder.binary(BinaryOp::Add, builder.int_lit(1), builder.name(size), int);
    let chained = ConstructorInitializer {
        kind: InitializerKind::Base,
        ctor: base_ctor,
        args: vec![Argument::value(builder.int_lit(4))],
        span: Span::detached(),
    };
    let model = builder.finish();

    let base_decl = type_decl(
        base,
        vec![MemberDecl::Constructor(ConstructorDecl {
            symbol: base_ctor,
            initializer: None,
            body: Some(Block::default()),
            span: Span::detached(),
        })],
    );
    let derived_decl = type_decl(
        derived,
        vec![
            MemberDecl::Field(FieldDecl {
                symbol: size,
                initializer: Some(init),
                span: Span::detached(),
            }),
            MemberDecl::Constructor(ConstructorDecl {
                symbol: derived_ctor,
                initializer: Some(chained),
                body: Some(Block::default()),
                span: Span::detached(),
            }),
        ],
    );
    let text = lower(&model, unit_in("App", vec![base_decl, derived_decl]));
    let init_call = text.find("__init__(this)");
    let base_call = text.find(".__ctor__(this, 4)");
    assert!(init_call.is_some() && base_call.is_some(), "{text}");
    assert!(init_call < base_call, "{text}");
    assert!(text.contains("__inherits__ = function (out)"), "{text}");
    assert!(text.contains("out.App.Shape"), "{text}");
}

#[test]
fn test_synthesized_ctor_calls_base_with_static_ctor() {
    let mut builder = ModelBuilder::new();
    let base = builder.class("App", "Registry");
    let setup = builder.static_constructor(base);
    let derived = builder.class("App", "Local");
    builder.set_base(derived, TypeRef::named(base));
    let model = builder.finish();

    let base_decl = type_decl(
        base,
        vec![MemberDecl::Constructor(ConstructorDecl {
            symbol: setup,
            initializer: None,
            body: Some(Block::default()),
            span: Span::detached(),
        })],
    );
    let text = lower(&model, unit_in("App", vec![base_decl, type_decl(derived, Vec::new())]));
    let Some(start) = text.find("namespace.class(\"Local\"") else {
        panic!("no Local registration:\n{text}");
    };
    expect_test::expect![[r#"
        namespace.class("Local", function (namespace)
                local __ctor__
                __ctor__ = function (this)
                    App.Registry.__ctor__(this)
                end
                return {
                    __inherits__ = function (out)
                        return { out.App.Registry }
                    end,
                    __ctor__ = __ctor__
                }
            end)
        end)
    "#]]
    .assert_eq(&text[start..]);
}

/// The accessor local is renamed around a type parameter of the same name,
/// but callers still find the getter under `getValue`
#[test]
fn test_renamed_accessor_local_keeps_member_key() {
    let mut builder = ModelBuilder::new();
    let int = builder.int();
    let ty = builder.generic_class("App", "Holder", &["getValue"]);
    let value = builder.property(ty, "Value", int, false);
    builder.make_public(value);
    let getter = match &builder.model().symbol(value).detail {
        SymbolDetail::Property {
            getter: Some(getter), ..
        } => *getter,
        _ => panic!("property without a getter"),
    };
    let decl = MemberDecl::Property(PropertyDecl {
        symbol: value,
        getter: Some(AccessorDecl {
            symbol: getter,
            body: Some(Body::Block(Block::of(vec![Stmt::new(StmtKind::Return(Some(builder.int_lit(1))))]))),
            span: Span::detached(),
        }),
        setter: None,
        initializer: None,
        expression_body: None,
        span: Span::detached(),
    });
    let model = builder.finish();

    let text = lower(&model, unit_in("App", vec![type_decl(ty, vec![decl])]));
    assert!(text.contains("getValue_1 = function (this)"), "{text}");
    assert!(text.contains("getValue = getValue_1"), "{text}");
    assert!(!text.contains("getValue_1 = getValue_1"), "{text}");
}
