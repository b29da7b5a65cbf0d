//! Slot assignment, run once capture analysis is complete.
//!
//! Sibling scopes reuse the same stack slots: a child starts numbering where its
//! parent's own locals end, and the function needs the deepest chain's count.
//! A scope with captured variables allocates a context one level below the
//! innermost context enclosing it.

use flint_stack::ensure_sufficient_stack;
use tracing::trace;

use crate::{ScopeId, ScopeTree, Storage, Variable, VariableKind};

/// Assign storage to every variable of the function's own scopes.
///
/// Returns the number of stack slots the function needs.
pub(crate) fn allocate(tree: &mut ScopeTree, variables: &mut [Variable], outer_level: u32) -> u32 {
    let root = tree.root();
    allocate_scope(tree, variables, root, 0, outer_level)
}

fn allocate_scope(
    tree: &mut ScopeTree,
    variables: &mut [Variable],
    id: ScopeId,
    first_slot: u32,
    enclosing_level: u32,
) -> u32 {
    let scope = tree.get(id);
    // Nested functions allocate when they are compiled.
    if scope.function_level > 0 {
        return first_slot;
    }
    let declared = scope.variables.clone();
    let children = scope.children.clone();

    let needs_context = declared.iter().any(|v| {
        let var = &variables[v.index()];
        var.captured && var.kind != VariableKind::Outer
    });
    let level = if needs_context {
        enclosing_level + 1
    } else {
        enclosing_level
    };

    let mut next_slot = first_slot;
    let mut context_size = 0;
    for var in declared {
        let variable = &mut variables[var.index()];
        if variable.kind == VariableKind::Outer {
            continue;
        }
        variable.storage = if variable.captured {
            context_size += 1;
            Storage::Context {
                level,
                index: context_size - 1,
            }
        } else if let Some(index) = variable.param_index {
            Storage::Parameter { index }
        } else {
            next_slot += 1;
            Storage::Stack {
                index: next_slot - 1,
            }
        };
        trace!(name = %variable.name, storage = %variable.storage, "allocated");
    }

    if needs_context {
        let scope = tree.get_mut(id);
        scope.context_level = Some(level);
        scope.context_size = context_size;
    }

    let mut needed = next_slot;
    for child in children {
        let used = ensure_sufficient_stack(|| allocate_scope(tree, variables, child, next_slot, level));
        needed = needed.max(used);
    }
    needed
}
