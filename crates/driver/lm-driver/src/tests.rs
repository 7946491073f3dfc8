use crate::{CompileOutput, Compiler, CompilerConfig, Diagnostics, DriverError, MANIFEST_FILE, ProfileName};
use lm_lower::{LowerError, RuntimeProfile};
use lm_override::OverrideProvider;
use lm_source::{
    Block, Body, CompilationUnit, EnumMemberDecl, MemberDecl, MethodDecl, ModelBuilder, NamespaceDecl,
    NamespaceMember, SemanticModel, SymbolId, TypeDecl, TypeRef,
};
use lm_span::{FileId, Span};
use std::fs;
use std::path::PathBuf;

fn unit(file: u32, path: &str, types: Vec<TypeDecl>) -> CompilationUnit {
    CompilationUnit {
        file: FileId::new(file),
        path: path.to_owned(),
        text: None,
        members: vec![NamespaceMember::Namespace(NamespaceDecl {
            name: "App".to_owned(),
            members: types.into_iter().map(NamespaceMember::Type).collect(),
            span: Span::detached(),
        })],
    }
}

fn type_decl(symbol: SymbolId, members: Vec<MemberDecl>) -> TypeDecl {
    TypeDecl {
        symbol,
        members,
        attributes: Vec::new(),
        span: Span::detached(),
    }
}

fn empty_method(symbol: SymbolId) -> MemberDecl {
    MemberDecl::Method(MethodDecl {
        symbol,
        body: Some(Body::Block(Block::default())),
        span: Span::detached(),
    })
}

/// `App.Color` in one file, `App.Program` split over two
fn program() -> (SemanticModel, Vec<CompilationUnit>) {
    let mut builder = ModelBuilder::new();
    let color = builder.enum_type("App", "Color");
    let red = builder.enum_member(color, "Red", 0);
    let program = builder.class("App", "Program");
    let main = builder.method(program, "Main", &[], TypeRef::Void);
    builder.make_static(main);
    let helper = builder.method(program, "Helper", &[], TypeRef::Void);
    builder.make_static(helper);
    let model = builder.finish();

    let units = vec![
        unit(
            0,
            "src/Color.cs",
            vec![type_decl(
                color,
                vec![MemberDecl::EnumMember(EnumMemberDecl {
                    symbol: red,
                    span: Span::detached(),
                })],
            )],
        ),
        unit(1, "src/Program.cs", vec![type_decl(program, vec![empty_method(main)])]),
        unit(2, "src/Program.Helper.cs", vec![type_decl(program, vec![empty_method(helper)])]),
    ];
    (model, units)
}

fn compile(model: SemanticModel, units: &[CompilationUnit], config: CompilerConfig) -> CompileOutput {
    let compiler = Compiler::new(model, OverrideProvider::new(), config);
    match compiler.compile(units) {
        Ok(output) => output,
        Err(error) => panic!("compilation failed: {error}"),
    }
}

#[test]
fn test_partial_type_is_emitted_once_in_first_unit() {
    let (model, units) = program();
    let output = compile(model, &units, CompilerConfig::default());

    let counts: Vec<usize> = output.units.iter().map(|unit| unit.type_count).collect();
    assert_eq!(counts, vec![1, 1, 0]);
    let emitted: Vec<&str> = output.emitted().map(|unit| unit.module.as_str()).collect();
    assert_eq!(emitted, vec!["src.Color", "src.Program"]);

    let Some(program) = output.units.get(1) else {
        panic!("missing unit");
    };
    let text = output.render_unit(program);
    assert!(text.contains("namespace.class(\"Program\""), "{text}");
    assert!(text.contains("Main"), "{text}");
    assert!(text.contains("Helper"), "{text}");
    assert_eq!(output.entry_point.as_deref(), Some("App.Program.Main"));
}

#[test]
fn test_manifest_lists_files_exports_and_entry() {
    let (model, units) = program();
    let output = compile(model, &units, CompilerConfig::default());
    expect_test::expect![[r#"
        return function (path)
            return System.init({ path = path, files = { "src.Color", "src.Program" }, counts = { 1, 1 }, types = { "App.Color" }, Main = "App.Program.Main" })
        end
    "#]]
    .assert_eq(&output.render_manifest());
}

#[test]
fn test_write_to_creates_unit_files_and_manifest() {
    let (model, units) = program();
    let mut config = CompilerConfig::default();
    config.compiler.indent = 2;
    let output = compile(model, &units, config);

    let Ok(dir) = tempfile::tempdir() else {
        panic!("cannot create temp dir");
    };
    let written = match output.write_to(dir.path(), "lua") {
        Ok(written) => written,
        Err(error) => panic!("write failed: {error}"),
    };
    let relative: Vec<PathBuf> = written
        .iter()
        .filter_map(|path| path.strip_prefix(dir.path()).ok())
        .map(PathBuf::from)
        .collect();
    assert_eq!(
        relative,
        vec![
            PathBuf::from("src/Color.lua"),
            PathBuf::from("src/Program.lua"),
            PathBuf::from(MANIFEST_FILE),
        ]
    );
    let color = fs::read_to_string(dir.path().join("src/Color.lua")).unwrap_or_default();
    assert!(color.starts_with("System.namespace(\"App\", function (namespace)\n  namespace.enum("), "{color}");
}

#[test]
fn test_manifest_can_be_disabled() {
    let (model, units) = program();
    let mut config = CompilerConfig::default();
    config.output.manifest = false;
    let output = compile(model, &units, config);

    let Ok(dir) = tempfile::tempdir() else {
        panic!("cannot create temp dir");
    };
    let written = output.write_to(dir.path(), "luau").unwrap_or_default();
    assert_eq!(written.len(), 2);
    assert!(!dir.path().join(MANIFEST_FILE).exists());
    assert!(dir.path().join("src/Program.luau").is_file());
}

#[test]
fn test_two_entry_points_name_the_unit() {
    let mut builder = ModelBuilder::new();
    let first = builder.class("App", "First");
    let first_main = builder.method(first, "Main", &[], TypeRef::Void);
    builder.make_static(first_main);
    let second = builder.class("App", "Second");
    let second_main = builder.method(second, "Main", &[], TypeRef::Void);
    builder.make_static(second_main);
    let model = builder.finish();
    let units = vec![
        unit(0, "First.cs", vec![type_decl(first, vec![empty_method(first_main)])]),
        unit(1, "Second.cs", vec![type_decl(second, vec![empty_method(second_main)])]),
    ];

    let compiler = Compiler::new(model, OverrideProvider::new(), CompilerConfig::default());
    let Err(error) = compiler.compile(&units) else {
        panic!("two entry points accepted");
    };
    let DriverError::Lower {
        unit,
        error: LowerError::MultipleEntryPoints { .. },
    } = &error
    else {
        panic!("unexpected error: {error}");
    };
    assert_eq!(unit, "Second.cs");

    let report = Diagnostics::new(&units).render(&error);
    expect_test::expect![[r#"
        error: multiple entry points: `App.First.Main` and `App.Second.Main`
          --> Second.cs@0..0
          --> First.cs@0..0
    "#]]
    .assert_eq(&report);
}

#[test]
fn test_missing_metadata_document_fails_before_lowering() {
    let (model, _) = program();
    let mut config = CompilerConfig::default();
    config.compiler.metadata = vec![PathBuf::from("/nonexistent/meta.toml")];
    config.compiler.profile = ProfileName::Classic;
    assert_eq!(config.lower_options().profile, RuntimeProfile::classic());

    let compiler = Compiler::with_config(model, config);
    assert!(matches!(compiler, Err(DriverError::Metadata(_))));
}
