//! Low-level IR blocks and the session coordinator.
//!
//! IR files interleave ordinary declarations with `ir { ... }` blocks.
//! Branches may name labels that have not been defined yet, possibly in a
//! block that a later pump iteration will parse, so the coordinator
//! carries forward-reference and back-patch state across iterations.

use crate::diagnostic::{Diagnostic, DiagnosticSink};
use crate::span::Span;

/// Position of one instruction inside the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrLoc {
    pub block: usize,
    pub inst: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IrInst {
    Const(i64),
    /// Defines a branch target. Label names are session-global.
    Label(String),
    /// `resolved` is patched in once the target label is defined.
    Br {
        target: String,
        resolved: Option<IrLoc>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrBlock {
    pub name: String,
    pub insts: Vec<IrInst>,
    pub span: Span,
}

/// All IR parsed during one session. Allocated eagerly at setup time when
/// the input kind calls for it.
#[derive(Debug, Default)]
pub struct IrContainer {
    pub blocks: Vec<IrBlock>,
}

#[derive(Debug)]
struct PendingBranch {
    target: String,
    site: IrLoc,
    span: Span,
}

/// Forward-reference bookkeeping threaded through pump iterations.
///
/// Owned by the MainOrIr pipeline strategy only; library pumping never
/// sees one.
#[derive(Debug)]
pub struct IrCoordinator {
    pub container: IrContainer,
    labels: Vec<(String, IrLoc)>,
    pending: Vec<PendingBranch>,
    sink: DiagnosticSink,
}

impl IrCoordinator {
    pub fn new(sink: DiagnosticSink) -> IrCoordinator {
        IrCoordinator {
            container: IrContainer::default(),
            labels: Vec::new(),
            pending: Vec::new(),
            sink,
        }
    }

    /// Start a new block; returns its index in the container.
    pub fn begin_block(&mut self, name: &str, span: Span) -> usize {
        self.container.blocks.push(IrBlock {
            name: name.to_owned(),
            insts: Vec::new(),
            span,
        });
        self.container.blocks.len() - 1
    }

    pub fn emit_const(&mut self, block: usize, value: i64) {
        self.container.blocks[block].insts.push(IrInst::Const(value));
    }

    fn lookup_label(&self, name: &str) -> Option<IrLoc> {
        self.labels
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, loc)| loc)
    }

    /// Define a label at the next instruction slot of `block`. Every
    /// pending branch waiting on this name is back-patched immediately.
    pub fn define_label(&mut self, block: usize, name: &str, span: Span) {
        if self.lookup_label(name).is_some() {
            self.sink.emit(
                Diagnostic::error(format!("label '{name}' is defined twice"), span)
                    .with_code("E0010"),
            );
            return;
        }
        let loc = IrLoc {
            block,
            inst: self.container.blocks[block].insts.len(),
        };
        self.container.blocks[block]
            .insts
            .push(IrInst::Label(name.to_owned()));
        self.labels.push((name.to_owned(), loc));

        let mut waiting = Vec::new();
        self.pending.retain(|p| {
            if p.target == name {
                waiting.push(p.site);
                false
            } else {
                true
            }
        });
        for site in waiting {
            if let IrInst::Br { resolved, .. } =
                &mut self.container.blocks[site.block].insts[site.inst]
            {
                *resolved = Some(loc);
            }
        }
    }

    /// Emit a branch in `block`. A branch to a not-yet-defined label is
    /// recorded as pending and patched when the label appears, even in a
    /// later pump iteration.
    pub fn emit_branch(&mut self, block: usize, target: &str, span: Span) {
        let resolved = self.lookup_label(target);
        let site = IrLoc {
            block,
            inst: self.container.blocks[block].insts.len(),
        };
        self.container.blocks[block].insts.push(IrInst::Br {
            target: target.to_owned(),
            resolved,
        });
        if resolved.is_none() {
            self.pending.push(PendingBranch {
                target: target.to_owned(),
                site,
                span,
            });
        }
    }

    pub fn unresolved_count(&self) -> usize {
        self.pending.len()
    }

    /// Called once after the pump loop: every still-pending branch is a
    /// reference to a label that never appeared.
    pub fn finish(&mut self) {
        for pending in self.pending.drain(..) {
            self.sink.emit(
                Diagnostic::error(
                    format!("branch to undefined label '{}'", pending.target),
                    pending.span,
                )
                .with_code("E0011"),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::FileId;

    fn span() -> Span {
        Span::empty(FileId(0), 0)
    }

    #[test]
    fn forward_branch_is_patched_when_the_label_appears() {
        let sink = DiagnosticSink::new();
        let mut ir = IrCoordinator::new(sink.clone());

        let first = ir.begin_block("entry", span());
        ir.emit_branch(first, "exit", span());
        assert_eq!(ir.unresolved_count(), 1);

        // Label shows up in a different block, as if parsed by a later
        // pump iteration.
        let second = ir.begin_block("tail", span());
        ir.define_label(second, "exit", span());
        assert_eq!(ir.unresolved_count(), 0);

        match &ir.container.blocks[first].insts[0] {
            IrInst::Br { resolved, .. } => {
                assert_eq!(*resolved, Some(IrLoc { block: second, inst: 0 }));
            }
            other => panic!("expected branch, got {other:?}"),
        }
        ir.finish();
        assert_eq!(sink.error_count(), 0);
    }

    #[test]
    fn backward_branch_resolves_immediately() {
        let mut ir = IrCoordinator::new(DiagnosticSink::new());
        let block = ir.begin_block("entry", span());
        ir.define_label(block, "top", span());
        ir.emit_const(block, 7);
        ir.emit_branch(block, "top", span());
        assert_eq!(ir.unresolved_count(), 0);
    }

    #[test]
    fn dangling_branches_are_diagnosed_at_finish() {
        let sink = DiagnosticSink::new();
        let mut ir = IrCoordinator::new(sink.clone());
        let block = ir.begin_block("entry", span());
        ir.emit_branch(block, "nowhere", span());
        ir.finish();
        assert_eq!(sink.error_count(), 1);
    }

    #[test]
    fn duplicate_labels_are_diagnosed() {
        let sink = DiagnosticSink::new();
        let mut ir = IrCoordinator::new(sink.clone());
        let block = ir.begin_block("entry", span());
        ir.define_label(block, "once", span());
        ir.define_label(block, "once", span());
        assert_eq!(sink.error_count(), 1);
    }
}
