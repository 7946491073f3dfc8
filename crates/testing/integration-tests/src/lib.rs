//! Integration test utilities for the luma compiler
//!
//! A [`TestFixture`] collects compilation units over one semantic model,
//! compiles them through the driver and loads every emitted chunk into an
//! interpreter, so tests can call lowered methods and compare the results
//! with what the source program means.

use anyhow::{Result, anyhow};
use lm_driver::{CompileOutput, Compiler, CompilerConfig, manifest_chunk};
use lm_interp::interpreter::first;
use lm_interp::{Interpreter, Value};
use lm_override::OverrideProvider;
use lm_source::{
    Block, Body, CompilationUnit, Expr, MemberDecl, MethodDecl, NamespaceDecl, NamespaceMember, SemanticModel, Stmt,
    StmtKind, SymbolId, TypeDecl,
};
use lm_span::{FileId, Span};

/// Type declaration with no attributes
pub fn type_decl(symbol: SymbolId, members: Vec<MemberDecl>) -> TypeDecl {
    TypeDecl {
        symbol,
        members,
        attributes: Vec::new(),
        span: Span::detached(),
    }
}

/// Method declaration with a block body
pub fn method_decl(symbol: SymbolId, stmts: Vec<Stmt>) -> MemberDecl {
    MemberDecl::Method(MethodDecl {
        symbol,
        body: Some(Body::Block(Block::of(stmts))),
        span: Span::detached(),
    })
}

/// `return value;`
pub fn ret(value: Expr) -> Stmt {
    Stmt::new(StmtKind::Return(Some(value)))
}

/// Expression statement
pub fn expr_stmt(expr: Expr) -> Stmt {
    Stmt::new(StmtKind::Expr(expr))
}

/// Test fixture helper
pub struct TestFixture {
    /// Program model shared by every unit
    pub model: SemanticModel,
    /// Units in compilation order
    pub units: Vec<CompilationUnit>,
    /// Project configuration handed to the driver
    pub config: CompilerConfig,
}

impl TestFixture {
    /// Creates a fixture over a finished model
    #[must_use]
    pub fn new(model: SemanticModel) -> Self {
        Self {
            model,
            units: Vec::new(),
            config: CompilerConfig::default(),
        }
    }

    /// Adds a unit declaring `types` inside `namespace`
    pub fn add_unit(&mut self, path: &str, namespace: &str, types: Vec<TypeDecl>) -> &mut Self {
        let file = FileId::new(u32::try_from(self.units.len()).unwrap_or(u32::MAX));
        self.units.push(CompilationUnit {
            file,
            path: path.to_owned(),
            text: None,
            members: vec![NamespaceMember::Namespace(NamespaceDecl {
                name: namespace.to_owned(),
                members: types.into_iter().map(NamespaceMember::Type).collect(),
                span: Span::detached(),
            })],
        });
        self
    }

    /// Compiles the units without running them
    ///
    /// # Errors
    ///
    /// Returns the rendered driver error when lowering fails
    pub fn compile(&self) -> Result<CompileOutput> {
        let compiler = Compiler::new(self.model.clone(), OverrideProvider::new(), self.config.clone());
        compiler.compile(&self.units).map_err(|error| anyhow!("{error}"))
    }

    /// Compiles the units and loads every emitted chunk
    ///
    /// # Errors
    ///
    /// Returns an error if lowering fails or a chunk raises while loading
    pub fn load(&self) -> Result<Session> {
        let output = self.compile()?;
        let mut interp = Interpreter::new();
        for unit in output.emitted() {
            interp
                .run(&unit.chunk)
                .map_err(|error| anyhow!("{}: {error}\n{}", unit.path, output.render_unit(unit)))?;
        }
        Ok(Session { interp, output })
    }
}

/// Loaded program
pub struct Session {
    /// Interpreter holding the program's globals
    pub interp: Interpreter,
    /// What the driver produced
    pub output: CompileOutput,
}

impl Session {
    /// Calls a static method by its qualified name and returns its first value
    ///
    /// # Errors
    ///
    /// Returns the runtime error, with the lowered program attached
    pub fn call(&mut self, path: &str, args: Vec<Value>) -> Result<Value> {
        self.call_all(path, args).map(first)
    }

    /// Calls a static method and returns every value it produced
    ///
    /// # Errors
    ///
    /// Returns the runtime error, with the lowered program attached
    pub fn call_all(&mut self, path: &str, args: Vec<Value>) -> Result<Vec<Value>> {
        self.interp
            .call_path(path, args)
            .map_err(|error| anyhow!("{path}: {error}\n{}", self.listing()))
    }

    /// Runs the manifest, which starts the entry point
    ///
    /// # Errors
    ///
    /// Returns the runtime error of the manifest or of `Main`
    pub fn run_main(&mut self) -> Result<Vec<Value>> {
        let loader = self
            .interp
            .run(&manifest_chunk(&self.output))
            .map(first)
            .map_err(|error| anyhow!("manifest: {error}"))?;
        self.interp
            .call(&loader, vec![Value::str("")])
            .map_err(|error| anyhow!("Main: {error}\n{}", self.listing()))
    }

    /// Lines the program printed
    pub fn printed(&self) -> &[String] {
        self.interp.output()
    }

    /// Rendered text of every emitted unit
    pub fn listing(&self) -> String {
        self.output
            .emitted()
            .map(|unit| format!("-- {}\n{}", unit.path, self.output.render_unit(unit)))
            .collect()
    }
}

/// Unwraps a fixture step, failing the test with the error chain
#[macro_export]
macro_rules! ok {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(error) => panic!("{error:#}"),
        }
    };
}
