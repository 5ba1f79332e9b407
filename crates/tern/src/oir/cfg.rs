//! CFG utilities over one OIR function: successor/predecessor maps,
//! reverse postorder, dominator tree, and dominance frontiers.
//!
//! Dominators use the iterative algorithm over reverse postorder; the
//! frontier computation is the standard two-predecessor walk. Iteration
//! order is deterministic, which keeps block-parameter insertion order
//! stable across runs.

use ahash::AHashMap;

use super::{BlockId, Function, Module, Terminator};

/// Per-function control-flow graph.
#[derive(Debug, Clone, Default)]
pub struct Cfg {
    pub blocks: Vec<BlockId>,
    pub succs: AHashMap<BlockId, Vec<BlockId>>,
    pub preds: AHashMap<BlockId, Vec<BlockId>>,
    /// Reverse postorder from the entry block.
    pub rpo: Vec<BlockId>,
}

impl Cfg {
    #[must_use]
    pub fn build(m: &Module, f: &Function) -> Self {
        let mut cfg = Self {
            blocks: f.blocks.clone(),
            ..Self::default()
        };

        for &bid in &f.blocks {
            let succs = terminator_targets(m.block(bid).term.as_ref());
            for &s in &succs {
                cfg.preds.entry(s).or_default().push(bid);
            }
            cfg.succs.insert(bid, succs);
        }
        for &bid in &f.blocks {
            cfg.preds.entry(bid).or_default();
        }

        if let Some(entry) = f.entry {
            let mut visited = vec![false; m.blocks.len()];
            let mut post = Vec::new();
            postorder(&cfg, entry, &mut visited, &mut post);
            post.reverse();
            cfg.rpo = post;
        }

        cfg
    }

    #[must_use]
    pub fn succs_of(&self, b: BlockId) -> &[BlockId] {
        self.succs.get(&b).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn preds_of(&self, b: BlockId) -> &[BlockId] {
        self.preds.get(&b).map_or(&[], Vec::as_slice)
    }
}

fn postorder(cfg: &Cfg, b: BlockId, visited: &mut [bool], out: &mut Vec<BlockId>) {
    if visited[b.index()] {
        return;
    }
    visited[b.index()] = true;
    for &s in cfg.succs_of(b) {
        postorder(cfg, s, visited, out);
    }
    out.push(b);
}

#[must_use]
pub fn terminator_targets(term: Option<&Terminator>) -> Vec<BlockId> {
    match term {
        Some(Terminator::Br { target, .. }) => vec![*target],
        Some(Terminator::CondBr {
            then_bb, else_bb, ..
        }) => {
            if then_bb == else_bb {
                vec![*then_bb]
            } else {
                vec![*then_bb, *else_bb]
            }
        }
        Some(Terminator::Ret { .. }) | None => Vec::new(),
    }
}

/// Immediate-dominator tree plus dominance frontiers.
#[derive(Debug, Clone, Default)]
pub struct DomTree {
    /// Immediate dominator per block; the entry maps to itself.
    pub idom: AHashMap<BlockId, BlockId>,
    pub frontier: AHashMap<BlockId, Vec<BlockId>>,
    /// Children in the dominator tree, in deterministic order.
    pub children: AHashMap<BlockId, Vec<BlockId>>,
}

impl DomTree {
    #[must_use]
    pub fn build(cfg: &Cfg, entry: BlockId) -> Self {
        let rpo = &cfg.rpo;
        let mut rpo_index: AHashMap<BlockId, usize> = AHashMap::new();
        for (i, &b) in rpo.iter().enumerate() {
            rpo_index.insert(b, i);
        }

        let mut idom: AHashMap<BlockId, BlockId> = AHashMap::new();
        idom.insert(entry, entry);

        let intersect = |idom: &AHashMap<BlockId, BlockId>,
                         rpo_index: &AHashMap<BlockId, usize>,
                         mut a: BlockId,
                         mut b: BlockId| {
            while a != b {
                while rpo_index[&a] > rpo_index[&b] {
                    a = idom[&a];
                }
                while rpo_index[&b] > rpo_index[&a] {
                    b = idom[&b];
                }
            }
            a
        };

        let mut changed = true;
        while changed {
            changed = false;
            for &b in rpo.iter().skip(1) {
                let mut new_idom: Option<BlockId> = None;
                for &p in cfg.preds_of(b) {
                    if !idom.contains_key(&p) {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => p,
                        Some(cur) => intersect(&idom, &rpo_index, cur, p),
                    });
                }
                if let Some(ni) = new_idom {
                    if idom.get(&b) != Some(&ni) {
                        idom.insert(b, ni);
                        changed = true;
                    }
                }
            }
        }

        // dominance frontiers
        let mut frontier: AHashMap<BlockId, Vec<BlockId>> = AHashMap::new();
        for &b in rpo {
            frontier.entry(b).or_default();
        }
        for &b in rpo {
            let preds = cfg.preds_of(b);
            if preds.len() < 2 {
                continue;
            }
            for &p in preds {
                if !idom.contains_key(&p) {
                    continue;
                }
                let mut runner = p;
                while runner != idom[&b] {
                    let entry = frontier.entry(runner).or_default();
                    if !entry.contains(&b) {
                        entry.push(b);
                    }
                    if runner == idom[&runner] {
                        break;
                    }
                    runner = idom[&runner];
                }
            }
        }

        // dominator-tree children in rpo order
        let mut children: AHashMap<BlockId, Vec<BlockId>> = AHashMap::new();
        for &b in rpo {
            if b == entry {
                continue;
            }
            if let Some(&parent) = idom.get(&b) {
                children.entry(parent).or_default().push(b);
            }
        }

        Self {
            idom,
            frontier,
            children,
        }
    }

    /// True when `a` dominates `b`.
    #[must_use]
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let mut cur = b;
        loop {
            if cur == a {
                return true;
            }
            let Some(&parent) = self.idom.get(&cur) else {
                return false;
            };
            if parent == cur {
                return false;
            }
            cur = parent;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Cfg, DomTree};
    use crate::oir::{block_id_from_index, Block, Function, Module, Terminator};
    use smallvec::smallvec;

    /// Diamond: 0 -> 1, 2; 1 -> 3; 2 -> 3.
    fn diamond() -> (Module, Function) {
        let mut m = Module::default();
        let b0 = m.add_block(Block::default());
        let b1 = m.add_block(Block::default());
        let b2 = m.add_block(Block::default());
        let b3 = m.add_block(Block::default());
        let cond = m.add_value(crate::oir::Value {
            ty: crate::types::TypePool::new().builtin(crate::types::Builtin::Bool),
            eff: crate::oir::Effect::Pure,
            def: crate::oir::DefSite::None,
        });
        m.block_mut(b0).term = Some(Terminator::CondBr {
            cond,
            then_bb: b1,
            then_args: smallvec![],
            else_bb: b2,
            else_args: smallvec![],
        });
        m.block_mut(b1).term = Some(Terminator::Br {
            target: b3,
            args: smallvec![],
        });
        m.block_mut(b2).term = Some(Terminator::Br {
            target: b3,
            args: smallvec![],
        });
        m.block_mut(b3).term = Some(Terminator::Ret { value: None });
        let f = Function {
            name: "d".to_owned(),
            ret_ty: crate::types::TypePool::new().error(),
            fn_value: cond,
            blocks: vec![b0, b1, b2, b3],
            entry: Some(b0),
            pinned_slots: Vec::new(),
        };
        (m, f)
    }

    #[test]
    fn dominators_of_a_diamond() {
        let (m, f) = diamond();
        let cfg = Cfg::build(&m, &f);
        let dom = DomTree::build(&cfg, f.entry.unwrap());
        let b = |i| block_id_from_index(i);
        assert_eq!(dom.idom[&b(1)], b(0));
        assert_eq!(dom.idom[&b(2)], b(0));
        assert_eq!(dom.idom[&b(3)], b(0));
        assert!(dom.dominates(b(0), b(3)));
        assert!(!dom.dominates(b(1), b(3)));
    }

    #[test]
    fn join_block_is_in_branch_frontiers() {
        let (m, f) = diamond();
        let cfg = Cfg::build(&m, &f);
        let dom = DomTree::build(&cfg, f.entry.unwrap());
        let b = |i| block_id_from_index(i);
        assert_eq!(dom.frontier[&b(1)], vec![b(3)]);
        assert_eq!(dom.frontier[&b(2)], vec![b(3)]);
        assert!(dom.frontier[&b(0)].is_empty());
    }
}
