//! Per-node side tables produced by earlier analysis passes.

use bitflags::bitflags;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::{CanonicalRef, NodeRef};

/// Result type inferred for an expression.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InferredType {
    pub class: CanonicalRef,
    pub nullable: bool,
}

/// The single target an instance call site always reaches.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DirectCall {
    pub target: CanonicalRef,
    /// The receiver may be null and must be checked before the call.
    pub check_receiver_for_null: bool,
}

bitflags! {
    /// How a procedure is used across the program.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ProcedureAttributes: u8 {
        const HAS_DYNAMIC_INVOCATIONS = 1 << 0;
        const HAS_NON_THIS_USES = 1 << 1;
        const HAS_TEAR_OFF_USES = 1 << 2;
    }
}

impl ProcedureAttributes {
    /// Attributes assumed for procedures the analysis did not annotate.
    pub const CONSERVATIVE: ProcedureAttributes = ProcedureAttributes::all();
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataTables {
    inferred_types: FxHashMap<NodeRef, InferredType>,
    direct_calls: FxHashMap<NodeRef, DirectCall>,
    procedure_attributes: FxHashMap<CanonicalRef, ProcedureAttributes>,
}

impl MetadataTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inferred_type(&self, node: NodeRef) -> Option<InferredType> {
        self.inferred_types.get(&node).copied()
    }

    pub fn direct_call(&self, node: NodeRef) -> Option<DirectCall> {
        self.direct_calls.get(&node).copied()
    }

    /// Usage attributes of `procedure`; conservative when unannotated.
    pub fn procedure_attributes(&self, procedure: CanonicalRef) -> ProcedureAttributes {
        self.procedure_attributes
            .get(&procedure)
            .copied()
            .unwrap_or(ProcedureAttributes::CONSERVATIVE)
    }

    pub fn set_inferred_type(&mut self, node: NodeRef, ty: InferredType) {
        self.inferred_types.insert(node, ty);
    }

    pub fn set_direct_call(&mut self, node: NodeRef, call: DirectCall) {
        self.direct_calls.insert(node, call);
    }

    pub fn set_procedure_attributes(&mut self, procedure: CanonicalRef, attrs: ProcedureAttributes) {
        self.procedure_attributes.insert(procedure, attrs);
    }
}
