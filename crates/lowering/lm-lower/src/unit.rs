//! Compilation units and namespaces

use crate::context::{LowerCtx, LowerResult};
use crate::facts::ProgramFacts;
use crate::options::LowerOptions;
use lm_override::OverrideProvider;
use lm_source::{CompilationUnit, NamespaceMember, SemanticModel, TypeDecl};
use lm_span::Span;
use lm_target::{Block, Chunk, Expr, Function, Stmt};
use tracing::{debug, instrument};

/// Lowered form of one compilation unit
#[derive(Debug, Clone, PartialEq)]
pub struct UnitOutput {
    /// Path of the source unit
    pub path: String,
    /// Output chunk
    pub chunk: Chunk,
    /// Types declared by this unit
    pub type_count: usize,
    /// Qualified names of exported types
    pub exports: Vec<String>,
}

/// Lower one unit of a program whose facts were gathered beforehand
///
/// # Errors
///
/// The first construct that cannot be lowered aborts the unit.
pub fn lower_unit(
    unit: &CompilationUnit,
    model: &SemanticModel,
    overrides: &OverrideProvider,
    options: &LowerOptions,
    facts: &ProgramFacts<'_>,
) -> LowerResult<UnitOutput> {
    LowerCtx::new(model, overrides, options, facts, unit.file).lower_unit(unit)
}

impl LowerCtx<'_> {
    /// Lower a unit into a chunk of namespace registrations
    ///
    /// # Errors
    ///
    /// The first construct that cannot be lowered aborts the unit.
    #[instrument(level = "debug", skip_all, fields(path = %unit.path))]
    pub fn lower_unit(mut self, unit: &CompilationUnit) -> LowerResult<UnitOutput> {
        let mut groups: Vec<(String, Vec<&TypeDecl>)> = Vec::new();
        collect_namespaces(&unit.members, "", &mut groups);

        let mut chunk = Chunk::default();
        for (namespace, types) in groups {
            let types: Vec<&TypeDecl> = types
                .into_iter()
                .filter(|decl| self.facts.fragments(decl.symbol).is_empty() || self.facts.is_first_fragment(decl))
                .collect();
            if types.is_empty() {
                continue;
            }
            let span = types.first().map_or_else(Span::detached, |decl| decl.span);
            let stmt = self.lower_namespace(&namespace, &types, span)?;
            chunk.body.push(stmt);
        }
        debug!(types = self.type_count, exports = self.exports.len(), "unit lowered");
        Ok(UnitOutput {
            path: unit.path.clone(),
            chunk,
            type_count: self.type_count,
            exports: self.exports,
        })
    }

    /// `System.namespace("Ns", function (namespace) ... end)`
    fn lower_namespace(&mut self, namespace: &str, types: &[&TypeDecl], span: Span) -> LowerResult<Stmt> {
        self.enter_function(None, self.at(span));
        let param = self.synthetic("namespace");
        let mut body = Block::new();
        let lowered = types
            .iter()
            .try_for_each(|decl| self.lower_type(decl, &param, &mut body));
        self.leave_function()?;
        lowered?;
        let name = self
            .overrides
            .namespace_rename(namespace)
            .map_or_else(|| namespace.to_owned(), str::to_owned);
        Ok(Stmt::Expr(Expr::call(
            Expr::path("System.namespace"),
            vec![Expr::string(name), Expr::function(Function::new(vec![param], body))],
        )))
    }
}

/// Group type declarations by the dotted name of their namespace, in order
/// of first appearance
fn collect_namespaces<'unit>(
    members: &'unit [NamespaceMember],
    prefix: &str,
    groups: &mut Vec<(String, Vec<&'unit TypeDecl>)>,
) {
    for member in members {
        match member {
            NamespaceMember::Namespace(namespace) => {
                let name = if prefix.is_empty() {
                    namespace.name.clone()
                } else {
                    format!("{prefix}.{}", namespace.name)
                };
                collect_namespaces(&namespace.members, &name, groups);
            }
            NamespaceMember::Type(decl) => match groups.iter_mut().find(|(name, _)| name == prefix) {
                Some((_, types)) => types.push(decl),
                None => groups.push((prefix.to_owned(), vec![decl])),
            },
        }
    }
}
