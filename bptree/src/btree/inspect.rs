//! Whole-tree inspection report.

use crate::btree::invariants::InvariantViolation;
use crate::btree::tree::{BPlusTree, BTreeError};
use crate::storage::{NodeId, Storage};

/// Height and key count, gathered only from a well-formed tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeSummary {
    pub height: usize,
    pub keys: usize,
}

/// Result of inspecting a tree: the dump, a summary and every violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inspection {
    pub root: NodeId,
    pub dump: String,
    /// `None` when violations were found.
    pub summary: Option<TreeSummary>,
    pub violations: Vec<InvariantViolation>,
}

impl Inspection {
    /// Whether the tree has no invariant violations.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.violations.is_empty()
    }
}

impl std::fmt::Display for Inspection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dump)?;
        match self.summary {
            Some(TreeSummary { height, keys }) => {
                writeln!(f, "root={} height={height} keys={keys}", self.root)?;
            }
            None => writeln!(f, "root={} height=? keys=?", self.root)?,
        }

        if self.violations.is_empty() {
            return writeln!(f, "invariants: ok");
        }
        writeln!(f, "invariants: {} violation(s)", self.violations.len())?;
        for violation in &self.violations {
            writeln!(f, "  {violation}")?;
        }
        Ok(())
    }
}

impl<S: Storage> BPlusTree<S> {
    /// Dump the tree and check its invariants.
    ///
    /// Height and key count are only gathered when no violation was found,
    /// since both follow links the checker may have reported as broken.
    pub fn inspect(&mut self) -> Result<Inspection, BTreeError> {
        let dump = self.dump()?;
        let violations = self.check_invariants()?;
        let summary = if violations.is_empty() {
            Some(TreeSummary {
                height: self.height()?,
                keys: self.count()?,
            })
        } else {
            None
        };

        Ok(Inspection {
            root: self.root_id(),
            dump,
            summary,
            violations,
        })
    }
}
