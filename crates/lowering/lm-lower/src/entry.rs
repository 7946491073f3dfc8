//! Program entry point

use crate::context::LowerResult;
use crate::error::LowerError;
use lm_source::{CompilationUnit, MemberDecl, NamespaceMember, SemanticModel, SpecialType, SymbolId, TypeDecl, TypeRef};
use lm_span::{FileSpan, Span};
use tracing::debug;

/// The static `Main` a program starts at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    /// Method symbol
    pub symbol: SymbolId,
    /// Qualified name, `Namespace.Type.Main`
    pub name: String,
}

/// Find the single static `Main` among the program's methods
///
/// A candidate returns `void` or `int` and takes nothing or one string
/// array.
///
/// # Errors
///
/// [`LowerError::MultipleEntryPoints`] when a second candidate exists.
pub fn find_entry_point(model: &SemanticModel, units: &[CompilationUnit]) -> LowerResult<Option<EntryPoint>> {
    let mut found: Option<(EntryPoint, FileSpan)> = None;
    for unit in units {
        let mut candidates = Vec::new();
        for member in &unit.members {
            visit_namespace_member(model, member, &mut candidates);
        }
        for (symbol, span) in candidates {
            let span = model
                .symbol(symbol)
                .location
                .unwrap_or_else(|| FileSpan::new(unit.file, span));
            let owner = model
                .declaring_type(symbol)
                .map_or_else(String::new, |owner| model.full_name(owner));
            let entry = EntryPoint {
                symbol,
                name: format!("{owner}.{}", model.name(symbol)),
            };
            if let Some((first, first_span)) = &found {
                return Err(LowerError::MultipleEntryPoints {
                    first_name: first.name.clone(),
                    first: *first_span,
                    second_name: entry.name,
                    second: span,
                });
            }
            found = Some((entry, span));
        }
    }
    if let Some((entry, _)) = &found {
        debug!(entry = %entry.name, "entry point");
    }
    Ok(found.map(|(entry, _)| entry))
}

fn visit_namespace_member(model: &SemanticModel, member: &NamespaceMember, out: &mut Vec<(SymbolId, Span)>) {
    match member {
        NamespaceMember::Namespace(namespace) => {
            for inner in &namespace.members {
                visit_namespace_member(model, inner, out);
            }
        }
        NamespaceMember::Type(decl) => visit_type(model, decl, out),
    }
}

fn visit_type(model: &SemanticModel, decl: &TypeDecl, out: &mut Vec<(SymbolId, Span)>) {
    for member in &decl.members {
        match member {
            MemberDecl::Method(method) if is_entry_point(model, method.symbol) => out.push((method.symbol, method.span)),
            MemberDecl::Type(nested) => visit_type(model, nested, out),
            _ => {}
        }
    }
}

fn is_entry_point(model: &SemanticModel, method: SymbolId) -> bool {
    let data = model.symbol(method);
    if data.name != "Main" || !data.is_static {
        return false;
    }
    let Some(detail) = model.method(method) else {
        return false;
    };
    let returns = detail.return_type.is_void() || model.special(&detail.return_type) == Some(SpecialType::Int32);
    let takes = match detail.params.as_slice() {
        [] => true,
        [param] => matches!(model.type_of(*param), Some(TypeRef::Array(elem)) if model.is_string(elem)),
        _ => false,
    };
    returns && takes && detail.type_params.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lm_source::{Body, Block, MethodDecl, ModelBuilder};
    use lm_span::FileId;

    fn unit_with(types: Vec<TypeDecl>) -> CompilationUnit {
        CompilationUnit {
            file: FileId::new(0),
            path: "Program.cs".to_owned(),
            text: None,
            members: types.into_iter().map(NamespaceMember::Type).collect(),
        }
    }

    fn main_decl(symbol: SymbolId) -> MemberDecl {
        MemberDecl::Method(MethodDecl {
            symbol,
            body: Some(Body::Block(Block::default())),
            span: Span::detached(),
        })
    }

    #[test]
    fn test_single_main() {
        let mut builder = ModelBuilder::new();
        let string = builder.string();
        let program = builder.class("App", "Program");
        let main = builder.method(program, "Main", &[("args", TypeRef::Array(Box::new(string)))], TypeRef::Void);
        builder.make_static(main);
        let int = builder.int();
        let helper = builder.method(program, "Main", &[("x", int)], TypeRef::Void);
        builder.make_static(helper);
        let model = builder.finish();
        let unit = unit_with(vec![TypeDecl {
            symbol: program,
            members: vec![main_decl(main), main_decl(helper)],
            attributes: Vec::new(),
            span: Span::detached(),
        }]);

        let entry = find_entry_point(&model, &[unit]);
        assert_eq!(
            entry,
            Ok(Some(EntryPoint {
                symbol: main,
                name: "App.Program.Main".to_owned(),
            }))
        );
    }

    #[test]
    fn test_two_mains_are_rejected() {
        let mut builder = ModelBuilder::new();
        let first = builder.class("App", "First");
        let first_main = builder.method(first, "Main", &[], TypeRef::Void);
        builder.make_static(first_main);
        let second = builder.class("App", "Second");
        let int = builder.int();
        let second_main = builder.method(second, "Main", &[], int);
        builder.make_static(second_main);
        let model = builder.finish();
        let decl = |symbol, main| TypeDecl {
            symbol,
            members: vec![main_decl(main)],
            attributes: Vec::new(),
            span: Span::detached(),
        };
        let unit = unit_with(vec![decl(first, first_main), decl(second, second_main)]);

        let Err(LowerError::MultipleEntryPoints {
            first_name,
            second_name,
            ..
        }) = find_entry_point(&model, &[unit])
        else {
            panic!("expected two entry points to be rejected");
        };
        assert_eq!(first_name, "App.First.Main");
        assert_eq!(second_name, "App.Second.Main");
    }
}
