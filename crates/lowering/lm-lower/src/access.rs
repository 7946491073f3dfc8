//! Assignable locations
//!
//! A [`Place`] is what the left side of an assignment, the operand of `++`
//! and a `ref`/`out` argument lower to. Compound updates read and write the
//! same place, so impure receivers are first cached in temporaries.

use crate::context::{LowerCtx, LowerResult};
use crate::error::LowerError;
use lm_override::CodeTemplate;
use lm_span::FileSpan;
use lm_target::{Block, Expr, Name, PropertyAdapter, Stmt};
use std::mem;

/// A location that can be read and written
#[derive(Debug, Clone)]
pub(crate) enum Place {
    /// Local, parameter or type-level local
    Name(Name),
    /// `target.name`
    Field { target: Expr, name: Name },
    /// Property, indexer or event reached through accessor closures
    Accessor(PropertyAdapter),
    /// Member rewritten by metadata templates
    Template {
        receiver: Option<Expr>,
        args: Vec<Expr>,
        get: Option<CodeTemplate>,
        set: Option<CodeTemplate>,
        span: FileSpan,
    },
}

impl Place {
    /// Expression reading the current value
    pub(crate) fn read(&self) -> LowerResult<Expr> {
        Ok(match self {
            Self::Name(name) => Expr::Ident(name.clone()),
            Self::Field { target, name } => Expr::Member {
                target: Box::new(target.clone()),
                name: name.clone(),
                colon: false,
            },
            Self::Accessor(adapter) => Expr::PropertyAdapter(Box::new(PropertyAdapter {
                is_get: true,
                ..adapter.clone()
            })),
            Self::Template {
                receiver,
                args,
                get,
                span,
                ..
            } => {
                let Some(template) = get else {
                    return Err(LowerError::unsupported("read of a write-only member", *span));
                };
                template
                    .bind(receiver.as_ref(), args, &[])
                    .map_err(|error| LowerError::from_template(error, *span))?
            }
        })
    }

    /// Statement storing `value`
    pub(crate) fn write(&self, value: Expr) -> LowerResult<Stmt> {
        Ok(match self {
            Self::Accessor(adapter) => {
                let mut args = adapter.args.clone();
                args.push(value);
                Stmt::Expr(Expr::PropertyAdapter(Box::new(PropertyAdapter {
                    is_get: false,
                    args,
                    ..adapter.clone()
                })))
            }
            Self::Template {
                receiver,
                args,
                set,
                span,
                ..
            } => {
                let Some(template) = set else {
                    return Err(LowerError::unsupported("write of a read-only member", *span));
                };
                let mut args = args.clone();
                args.push(value);
                let bound = template
                    .bind(receiver.as_ref(), &args, &[])
                    .map_err(|error| LowerError::from_template(error, *span))?;
                Stmt::Expr(bound)
            }
            Self::Name(_) | Self::Field { .. } => Stmt::assign(self.read()?, value),
        })
    }

    /// Whether the place can join a multiple assignment as a target
    pub(crate) fn is_simple(&self) -> bool {
        matches!(self, Self::Name(_) | Self::Field { .. })
    }
}

/// Re-evaluating the expression yields the same value without side effects:
/// pure expressions and plain field paths over them
pub(crate) fn is_stable(expr: &Expr) -> bool {
    match expr {
        Expr::Member {
            target, colon: false, ..
        } => is_stable(target),
        other => other.is_pure(),
    }
}

impl LowerCtx<'_> {
    /// Cache an impure expression in a fresh local
    pub(crate) fn cache(&mut self, expr: Expr, out: &mut Block) -> LowerResult<Expr> {
        if is_stable(&expr) {
            return Ok(expr);
        }
        let temp = self.temp()?;
        out.push(Stmt::local(temp.clone(), expr));
        Ok(Expr::Ident(temp))
    }

    /// Make a place safe to read and then write: receivers and accessor
    /// arguments are evaluated once
    pub(crate) fn stabilize(&mut self, place: Place, out: &mut Block) -> LowerResult<Place> {
        Ok(match place {
            Place::Name(_) => place,
            Place::Field { target, name } => Place::Field {
                target: self.cache(target, out)?,
                name,
            },
            Place::Accessor(mut adapter) => {
                if let Some(target) = adapter.target.take() {
                    adapter.target = Some(self.cache(target, out)?);
                }
                let args = mem::take(&mut adapter.args);
                for arg in args {
                    let cached = self.cache(arg, out)?;
                    adapter.args.push(cached);
                }
                Place::Accessor(adapter)
            }
            Place::Template {
                receiver,
                args,
                get,
                set,
                span,
            } => {
                let receiver = match receiver {
                    Some(receiver) => Some(self.cache(receiver, out)?),
                    None => None,
                };
                let mut cached = Vec::with_capacity(args.len());
                for arg in args {
                    cached.push(self.cache(arg, out)?);
                }
                Place::Template {
                    receiver,
                    args: cached,
                    get,
                    set,
                    span,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lm_render::Renderer;

    fn render(stmt: &Stmt) -> String {
        Renderer::new(4).render_stmt(stmt).trim_end().to_owned()
    }

    #[test]
    fn test_accessor_write_appends_value() {
        let place = Place::Accessor(PropertyAdapter {
            target: Some(Expr::ident("shape")),
            name: Name::from("Size"),
            is_get: true,
            is_property: true,
            colon: true,
            args: Vec::new(),
        });
        let write = place.write(Expr::int(3));
        assert_eq!(write.map(|stmt| render(&stmt)).ok().as_deref(), Some("shape:setSize(3)"));
    }

    #[test]
    fn test_field_round_trip() {
        let place = Place::Field {
            target: Expr::ident("this"),
            name: Name::from("count"),
        };
        let read = place.read().ok();
        let write = place.write(Expr::int(0)).map(|stmt| render(&stmt)).ok();
        assert_eq!(read, Some(Expr::member(Expr::ident("this"), "count")));
        assert_eq!(write.as_deref(), Some("this.count = 0"));
    }
}
