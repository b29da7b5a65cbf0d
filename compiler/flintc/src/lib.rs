//! Driver for the flint frontend.
//!
//! Loads a source unit, builds scopes and flow graphs for its members, and
//! renders them for the `flint` CLI. Members of one unit compile in parallel:
//! the unit's buffer is immutable and its constant pool and cache are safe to
//! share, so each worker only owns its own evaluator and builders.

mod commands;
mod options;
mod pipeline;


use std::sync::Once;

use thiserror::Error;

use flint_flow::BuildError;
use flint_ir::IrError;
use flint_scope::ScopeError;

pub use commands::{dump, graph, scopes};
pub use options::{parse_command_line, parse_kind, CommandLine, CompilerOptions};
pub use pipeline::{
    analyze, compilable_members, compile_all, compile_function, compile_member, resolve_member,
    CompiledFunction, CompiledMember,
};

/// Why a command or compilation failed.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Ir(#[from] IrError),
    #[error(transparent)]
    Scope(#[from] ScopeError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error("no member named '{0}'")]
    UnknownMember(String),
    #[error("invalid option '{option}': {reason}")]
    InvalidOption { option: String, reason: String },
    #[error("cannot start worker threads: {0}")]
    ThreadPool(String),
}

static TRACING_INIT: Once = Once::new();

/// Install the tracing subscriber.
///
/// Does nothing unless `RUST_LOG` is set. With `FLINT_TRACE_TREE` set, spans
/// print as an indented tree instead of flat lines. Safe to call repeatedly.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var_os("RUST_LOG").is_none() {
            return;
        }
        let filter = EnvFilter::from_default_env();
        if std::env::var_os("FLINT_TRACE_TREE").is_some() {
            let tree = tracing_tree::HierarchicalLayer::new(2)
                .with_targets(true)
                .with_bracketed_fields(true);
            tracing_subscriber::registry().with(tree).with(filter).init();
        } else {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}
