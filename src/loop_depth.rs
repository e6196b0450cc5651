// This module annotates every block with its loop nesting depth using
// repeated strongly-connected-component sweeps instead of a dominator
// tree. Each round runs a non-recursive Tarjan SCC pass over the blocks
// not yet deleted, following only edges to non-deleted successors. Every
// component that actually loops (more than one node, or a single node with
// a self-edge) increments the depth of all its members, and the
// component's Tarjan root is then deleted, which exposes the loops nested
// inside it on the next round. Non-looping singleton components are simply
// deleted. The analysis assumes no two distinct loops share a head via
// independent back-edges; irreducible graphs yield a best-effort count
// rather than a failure.

//! Loop nesting depth.

use fixedbitset::FixedBitSet;

use crate::ir::{BlockId, Function};

const UNVISITED: u32 = u32::MAX;

/// Per-sweep transient state. The deleted set is the only thing carried
/// across rounds.
struct SweepState {
    index: Vec<u32>,
    lowlink: Vec<u32>,
    on_stack: FixedBitSet,
    scc_stack: Vec<usize>,
    counter: u32,
}

/// Computes `loop_nest_depth` for every block of `func`, starting from
/// zero. Only the successor edges matter; instructions and phis are
/// ignored.
pub fn compute_loop_nest_depth(func: &mut Function) {
    let n = func.num_blocks();
    if n == 0 {
        return;
    }
    for bi in 0..n {
        func.block_mut(BlockId(bi as u32)).loop_nest_depth = 0;
    }
    let mut deleted = FixedBitSet::with_capacity(n);
    let mut rounds = 0usize;
    while deleted.count_ones(..) < n {
        rounds += 1;
        sweep(func, &mut deleted);
    }
    log::debug!("loop nest depth({}) settled after {} rounds", func.name(), rounds);
}

/// One full SCC decomposition of the not-yet-deleted subgraph.
fn sweep(func: &mut Function, deleted: &mut FixedBitSet) {
    let n = func.num_blocks();
    let mut st = SweepState {
        index: vec![UNVISITED; n],
        lowlink: vec![0; n],
        on_stack: FixedBitSet::with_capacity(n),
        scc_stack: Vec::new(),
        counter: 0,
    };
    for root in 0..n {
        if deleted.contains(root) || st.index[root] != UNVISITED {
            continue;
        }
        strongconnect(func, deleted, &mut st, root);
    }
}

/// Tarjan's algorithm with an explicit frame stack; function CFGs can be
/// arbitrarily large, so recursion is off the table.
fn strongconnect(func: &mut Function, deleted: &mut FixedBitSet, st: &mut SweepState, root: usize) {
    st.index[root] = st.counter;
    st.lowlink[root] = st.counter;
    st.counter += 1;
    st.on_stack.insert(root);
    st.scc_stack.push(root);
    let mut frames: Vec<(usize, usize)> = vec![(root, 0)];

    while let Some(frame) = frames.last_mut() {
        let (v, next) = (frame.0, frame.1);
        let succ = func
            .block(BlockId(v as u32))
            .out_edges()
            .get(next)
            .copied();
        match succ {
            Some(w) => {
                frame.1 += 1;
                let wi = w.index();
                if deleted.contains(wi) {
                    continue;
                }
                if st.index[wi] == UNVISITED {
                    st.index[wi] = st.counter;
                    st.lowlink[wi] = st.counter;
                    st.counter += 1;
                    st.on_stack.insert(wi);
                    st.scc_stack.push(wi);
                    frames.push((wi, 0));
                } else if st.on_stack.contains(wi) && st.index[wi] < st.lowlink[v] {
                    st.lowlink[v] = st.index[wi];
                }
            }
            None => {
                frames.pop();
                if let Some(&(parent, _)) = frames.last() {
                    if st.lowlink[v] < st.lowlink[parent] {
                        st.lowlink[parent] = st.lowlink[v];
                    }
                }
                if st.lowlink[v] == st.index[v] {
                    // v is the canonical root of the component closing
                    // here.
                    let mut component = Vec::new();
                    while let Some(w) = st.scc_stack.pop() {
                        st.on_stack.set(w, false);
                        component.push(w);
                        if w == v {
                            break;
                        }
                    }
                    process_component(func, deleted, &component, v);
                }
            }
        }
    }
}

fn process_component(
    func: &mut Function,
    deleted: &mut FixedBitSet,
    component: &[usize],
    root: usize,
) {
    let looping = component.len() > 1
        || func
            .block(BlockId(root as u32))
            .out_edges()
            .iter()
            .any(|&s| s.index() == root);
    if looping {
        for &m in component {
            func.block_mut(BlockId(m as u32)).loop_nest_depth += 1;
        }
        log::trace!("loop component {:?}, peeling root {}", component, root);
    }
    // Peeling the root of a loop exposes the loops nested inside it on
    // the next round; a non-loop singleton is just finished.
    deleted.insert(root);
}
