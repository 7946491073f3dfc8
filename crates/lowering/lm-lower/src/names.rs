//! Output names of members and type references

use crate::context::{LowerCtx, LowerResult};
use crate::error::LowerError;
use lm_scope::reserved;
use lm_source::{MethodKind, SymbolDetail, SymbolId, SymbolKind, TypeRef};
use lm_span::Span;
use lm_target::{Expr, Name};
use tracing::trace;

/// Append `_` to a member name that is a target keyword
pub fn escape_member(name: &str) -> String {
    if reserved::is_keyword(name) {
        format!("{name}_")
    } else {
        name.to_owned()
    }
}

impl LowerCtx<'_> {
    /// Output name of a member, stable for the whole run
    ///
    /// Overrides keep the overridden member's name and interface
    /// implementations keep the interface member's name; other overloads are
    /// numbered in declaration order. A metadata rename wins over everything.
    pub(crate) fn member_name(&mut self, member: SymbolId, span: Span) -> LowerResult<String> {
        if let Some(name) = self.member_names.get(&member) {
            return Ok(name.clone());
        }
        let name = self.compute_member_name(member, span)?;
        trace!(member = self.model.name(member), output = %name, "member name");
        self.member_names.insert(member, name.clone());
        Ok(name)
    }

    fn compute_member_name(&mut self, member: SymbolId, span: Span) -> LowerResult<String> {
        let model = self.model;
        let data = model.symbol(member);
        match &data.detail {
            SymbolDetail::Method(detail) => {
                if let Some(rename) = self
                    .overrides
                    .method_rename(model, member)
                    .map_err(|error| LowerError::from_metadata(error, self.at(span)))?
                {
                    return Ok(rename.to_owned());
                }
                if matches!(
                    detail.method_kind,
                    MethodKind::PropertyGet | MethodKind::PropertySet | MethodKind::EventAdd | MethodKind::EventRemove
                ) && let Some(owner) = detail.associated
                {
                    return self.member_name(owner, span);
                }
                if let Some(overridden) = detail.overridden {
                    return self.member_name(overridden, span);
                }
                if let Some(interface_method) = detail.implements.first() {
                    return self.member_name(*interface_method, span);
                }
                let base = escape_member(&data.name);
                let index = self.overload_index(member);
                Ok(if index == 0 { base } else { format!("{base}{index}") })
            }
            SymbolDetail::Property { params, .. } if !params.is_empty() => Ok(String::new()),
            SymbolDetail::Property { .. } => Ok(self
                .overrides
                .property_rename(model, member)
                .map_or_else(|| escape_member(&data.name), str::to_owned)),
            _ => Ok(escape_member(&data.name)),
        }
    }

    /// Position of a method among the same-named ordinary overloads of its type
    fn overload_index(&self, method: SymbolId) -> usize {
        let model = self.model;
        let Some(owner) = model.declaring_type(method) else {
            return 0;
        };
        let name = model.name(method);
        model
            .members(owner)
            .iter()
            .copied()
            .filter(|candidate| {
                model.name(*candidate) == name
                    && model.method(*candidate).is_some_and(|detail| {
                        matches!(detail.method_kind, MethodKind::Ordinary | MethodKind::Operator)
                            && detail.overridden.is_none()
                            && detail.implements.is_empty()
                    })
            })
            .position(|candidate| candidate == method)
            .unwrap_or(0)
    }

    /// Dotted global path of a named type
    pub(crate) fn type_path(&self, ty: SymbolId) -> String {
        let model = self.model;
        if let Some(rename) = self.overrides.type_rename(model, ty) {
            return rename.to_owned();
        }
        let namespace = model.namespace_of(ty);
        let nested = model.nested_name(ty);
        let namespace = self
            .overrides
            .namespace_rename(&namespace)
            .map_or(namespace.clone(), str::to_owned);
        if namespace.is_empty() {
            nested
        } else {
            format!("{namespace}.{nested}")
        }
    }

    /// Expression naming a type at run time
    pub(crate) fn type_expr(&self, ty: &TypeRef) -> Expr {
        self.type_expr_in(ty, None)
    }

    /// Expression naming a type, with global paths rooted at `root`
    pub(crate) fn type_expr_in(&self, ty: &TypeRef, root: Option<&Name>) -> Expr {
        let rooted = |path: &str| match root {
            Some(root) => path
                .split('.')
                .fold(Expr::Ident(root.clone()), Expr::member),
            None => Expr::path(path),
        };
        match ty {
            TypeRef::Named { symbol, args } => {
                let path = rooted(&self.type_path(*symbol));
                if args.is_empty() {
                    path
                } else {
                    let args = args.iter().map(|arg| self.type_expr_in(arg, root)).collect();
                    Expr::call(path, args)
                }
            }
            TypeRef::Param(param) => self
                .scopes
                .resolve(*param)
                .map_or_else(|| Expr::ident(self.model.name(*param)), |name| Expr::Ident(name.clone())),
            TypeRef::Array(elem) => Expr::call(rooted("System.Array"), vec![self.type_expr_in(elem, root)]),
            TypeRef::Nullable(inner) => Expr::call(rooted("System.Nullable"), vec![self.type_expr_in(inner, root)]),
            TypeRef::Void | TypeRef::Dynamic => rooted("System.Object"),
        }
    }

    /// Runtime type expression for a type symbol, applying its own parameters
    pub(crate) fn self_type_expr(&self, ty: SymbolId) -> Expr {
        let args = self
            .model
            .type_detail(ty)
            .map(|detail| detail.type_params.iter().map(|param| TypeRef::Param(*param)).collect())
            .unwrap_or_default();
        self.type_expr(&TypeRef::Named { symbol: ty, args })
    }

    /// Whether a symbol is a local-like binding resolved through the scope tree
    pub(crate) fn is_local_like(&self, symbol: SymbolId) -> bool {
        matches!(
            self.model.symbol(symbol).kind,
            SymbolKind::Local | SymbolKind::Parameter | SymbolKind::RangeVariable
        ) || self
            .model
            .method(symbol)
            .is_some_and(|detail| detail.method_kind == MethodKind::LocalFunction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::ProgramFacts;
    use crate::options::LowerOptions;
    use lm_override::OverrideProvider;
    use lm_render::Renderer;
    use lm_source::ModelBuilder;
    use lm_span::FileId;

    #[test]
    fn test_overloads_overrides_and_keywords() {
        let mut builder = ModelBuilder::new();
        let int = builder.int();
        let string = builder.string();
        let base = builder.class("App", "Base");
        let describe = builder.method(base, "Describe", &[], string.clone());
        let derived = builder.class("App", "List");
        builder.set_base(derived, TypeRef::named(base));
        let add = builder.method(derived, "Add", &[("x", int.clone())], TypeRef::Void);
        let add_two = builder.method(derived, "Add", &[("x", int.clone()), ("y", int)], TypeRef::Void);
        let overriding = builder.method(derived, "Describe", &[], string);
        builder.set_overridden(overriding, describe);
        let add_text = builder.method(derived, "Add", &[], TypeRef::Void);
        let keyword = builder.method(derived, "end", &[], TypeRef::Void);
        let model = builder.finish();
        let overrides = OverrideProvider::new();
        let options = LowerOptions::default();
        let facts = ProgramFacts::default();
        let mut ctx = LowerCtx::new(&model, &overrides, &options, &facts, FileId::new(0));

        let mut name = |member| ctx.member_name(member, Span::detached()).unwrap_or_default();
        assert_eq!(name(add), "Add");
        assert_eq!(name(add_two), "Add1");
        assert_eq!(name(add_text), "Add2");
        assert_eq!(name(overriding), "Describe");
        assert_eq!(name(keyword), "end_");
    }

    #[test]
    fn test_type_paths() {
        let mut builder = ModelBuilder::new();
        let outer = builder.class("Game", "World");
        let inner = builder.nested_class(outer, "Cell");
        let list = builder.generic_class("Game", "Bag", &["T"]);
        let int = builder.int();
        let model = builder.finish();
        let overrides = OverrideProvider::new();
        let options = LowerOptions::default();
        let facts = ProgramFacts::default();
        let ctx = LowerCtx::new(&model, &overrides, &options, &facts, FileId::new(0));

        assert_eq!(ctx.type_path(inner), "Game.World.Cell");
        let bag = TypeRef::Named {
            symbol: list,
            args: vec![int],
        };
        let rendered = Renderer::new(4).render_expr(&ctx.type_expr(&bag));
        assert_eq!(rendered, "Game.Bag(System.Int32)");
        let root = Name::from("global");
        let rooted = Renderer::new(4).render_expr(&ctx.type_expr_in(&TypeRef::named(outer), Some(&root)));
        assert_eq!(rooted, "global.Game.World");
    }
}
