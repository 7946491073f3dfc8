//! `manifest.lua`: what the runtime loader needs to start a program
//!
//! ```lua
//! return function (path)
//!     return System.init({
//!         path = path,
//!         files = { "App.Program" },
//!         counts = { 2 },
//!         types = { "App.Color" },
//!         Main = "App.Program.Main"
//!     })
//! end
//! ```

use crate::compiler::CompileOutput;
use lm_target::{Block, Chunk, Expr, Function, Name, Stmt, TableItem};

/// File name of the manifest inside the output directory
pub const MANIFEST_FILE: &str = "manifest.lua";

/// Build the manifest chunk of a compiled program
pub fn manifest_chunk(output: &CompileOutput) -> Chunk {
    let units: Vec<_> = output.emitted().collect();
    let files = units.iter().map(|unit| Expr::string(unit.module.clone())).collect();
    let counts = units.iter().map(|unit| Expr::int(unit.type_count as i64)).collect();
    let types = output.exports().map(Expr::string).collect();

    let mut items = vec![
        TableItem::Keyed(Name::new("path"), Expr::ident("path")),
        TableItem::Keyed(Name::new("files"), list(files)),
        TableItem::Keyed(Name::new("counts"), list(counts)),
        TableItem::Keyed(Name::new("types"), list(types)),
    ];
    if let Some(entry) = &output.entry_point {
        items.push(TableItem::Keyed(Name::new("Main"), Expr::string(entry.clone())));
    }
    let init = Expr::call(Expr::path("System.init"), vec![Expr::Table(items)]);
    let loader = Function::new(vec![Name::new("path")], Block::of(vec![Stmt::Return(vec![init])]));
    Chunk {
        body: Block::of(vec![Stmt::Return(vec![Expr::function(loader)])]),
    }
}

fn list(items: Vec<Expr>) -> Expr {
    Expr::Table(items.into_iter().map(TableItem::Positional).collect())
}
