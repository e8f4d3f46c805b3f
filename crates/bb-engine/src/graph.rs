//! Bus graph
//!
//! Buses live in a flat arena and refer to each other by id through an
//! index map, never by owning pointers, so iteration order and cache
//! behavior stay predictable. Every mutation re-verifies the topological
//! order; a routing change that would introduce a cycle is rejected and
//! not applied. The master bus is the designated node 0.

use bb_core::{BusDef, BusId, EngineError, EngineResult, MASTER_BUS_ID, Sample, db_to_gain};

use crate::insert::InsertChain;

/// One bus: input accumulator, gain stages, and an effect chain
pub struct BusNode {
    pub id: BusId,
    pub name: String,
    input_gain_db: f64,
    output_gain_db: f64,
    input_gain: f64,
    output_gain: f64,
    pub chain: InsertChain,
    /// Downstream bus id; master points at itself
    output_to: BusId,
    in_l: Vec<Sample>,
    in_r: Vec<Sample>,
}

impl BusNode {
    pub fn new(def: &BusDef, block_len: usize) -> Self {
        Self {
            id: def.id,
            name: def.name.clone(),
            input_gain_db: def.input_gain_db,
            output_gain_db: def.output_gain_db,
            input_gain: db_to_gain(def.input_gain_db),
            output_gain: db_to_gain(def.output_gain_db),
            chain: InsertChain::new(),
            output_to: def.output_to,
            in_l: vec![0.0; block_len],
            in_r: vec![0.0; block_len],
        }
    }

    pub fn def(&self) -> BusDef {
        BusDef {
            id: self.id,
            name: self.name.clone(),
            input_gain_db: self.input_gain_db,
            output_gain_db: self.output_gain_db,
            output_to: self.output_to,
        }
    }

    pub fn set_gains_db(&mut self, input_db: f64, output_db: f64) {
        self.input_gain_db = input_db.clamp(-96.0, 24.0);
        self.output_gain_db = output_db.clamp(-96.0, 24.0);
        self.input_gain = db_to_gain(self.input_gain_db);
        self.output_gain = db_to_gain(self.output_gain_db);
    }

    #[inline]
    pub fn output_to(&self) -> BusId {
        self.output_to
    }
}

pub struct BusGraph {
    nodes: Vec<BusNode>,
    /// Non-master node indices in processing order
    order: Vec<usize>,
    block_len: usize,
}

impl BusGraph {
    pub fn new(block_len: usize) -> Self {
        let master = BusNode::new(&BusDef::master(), block_len);
        Self {
            nodes: vec![master],
            order: Vec::new(),
            block_len,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        false // the master always exists
    }

    pub fn index_of(&self, id: BusId) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }

    pub fn node(&self, id: BusId) -> Option<&BusNode> {
        self.index_of(id).map(|i| &self.nodes[i])
    }

    pub fn node_mut(&mut self, id: BusId) -> Option<&mut BusNode> {
        let idx = self.index_of(id)?;
        Some(&mut self.nodes[idx])
    }

    pub fn nodes(&self) -> &[BusNode] {
        &self.nodes
    }

    /// Add a bus. The new node's route target must exist; verification
    /// re-runs the topological sort. A rejected node is handed back so the
    /// caller can return it across the thread boundary for dropping.
    pub fn add_bus(&mut self, node: BusNode) -> Result<(), BusNode> {
        if self.index_of(node.id).is_some() || self.index_of(node.output_to).is_none() {
            return Err(node);
        }
        self.nodes.push(node);
        match self.compute_order() {
            Ok(order) => {
                self.order = order;
                Ok(())
            }
            Err(_) => Err(self.nodes.pop().expect("just pushed")),
        }
    }

    pub fn remove_bus(&mut self, id: BusId) -> Option<BusNode> {
        if id == MASTER_BUS_ID {
            return None;
        }
        let idx = self.index_of(id)?;
        let node = self.nodes.remove(idx);
        // Reroute anything that fed the removed bus into the master
        for other in self.nodes.iter_mut() {
            if other.output_to == id {
                other.output_to = MASTER_BUS_ID;
            }
        }
        self.order = self.compute_order().unwrap_or_default();
        Some(node)
    }

    /// Route `from`'s output into `to`. Rejected with [`EngineError::GraphCycle`]
    /// if the new edge closes a loop; the previous routing is kept.
    pub fn connect(&mut self, from: BusId, to: BusId) -> EngineResult<()> {
        if from == MASTER_BUS_ID {
            return Err(EngineError::InvalidState("master output is fixed"));
        }
        let from_idx = self
            .index_of(from)
            .ok_or(EngineError::InvalidState("unknown source bus"))?;
        self.index_of(to)
            .ok_or(EngineError::InvalidState("unknown target bus"))?;

        let previous = self.nodes[from_idx].output_to;
        self.nodes[from_idx].output_to = to;
        match self.compute_order() {
            Ok(order) => {
                self.order = order;
                Ok(())
            }
            Err(e) => {
                self.nodes[from_idx].output_to = previous;
                Err(e)
            }
        }
    }

    /// Topological order over the `output_to` edges; `Err(GraphCycle)` if
    /// the routing is not acyclic.
    fn compute_order(&self) -> EngineResult<Vec<usize>> {
        let n = self.nodes.len();
        let mut state = vec![0u8; n]; // 0 unvisited, 1 in progress, 2 done
        let mut order = Vec::with_capacity(n);

        // Iterative DFS following the single outgoing edge per node;
        // a node whose walk returns to an in-progress node closes a cycle.
        for start in 0..n {
            if state[start] != 0 {
                continue;
            }
            let mut path = vec![start];
            state[start] = 1;
            loop {
                let current = *path.last().unwrap();
                let next_id = self.nodes[current].output_to;
                let next = self.index_of(next_id).unwrap_or(current);
                if next == current || state[next] == 2 {
                    // Terminal (master) or already finished: unwind
                    while let Some(done) = path.pop() {
                        state[done] = 2;
                        order.push(done);
                    }
                    break;
                }
                if state[next] == 1 {
                    return Err(EngineError::GraphCycle);
                }
                state[next] = 1;
                path.push(next);
            }
        }

        // Downstream-first unwinding gives dependency order; reverse it so
        // sources process before their destinations, then drop the master.
        order.reverse();
        Ok(order
            .into_iter()
            .filter(|&i| self.nodes[i].id != MASTER_BUS_ID)
            .collect())
    }

    pub fn clear_inputs(&mut self) {
        for node in &mut self.nodes {
            node.in_l.fill(0.0);
            node.in_r.fill(0.0);
        }
    }

    /// Mix a signal into a bus input
    pub fn add_to_input(&mut self, id: BusId, gain: f64, left: &[Sample], right: &[Sample]) {
        if let Some(idx) = self.index_of(id) {
            let node = &mut self.nodes[idx];
            let len = left.len().min(node.in_l.len());
            for i in 0..len {
                node.in_l[i] += left[i] * gain;
                node.in_r[i] += right[i] * gain;
            }
        }
    }

    /// Process all non-master buses in topological order, each feeding its
    /// destination's input. The master's accumulated input is left for the
    /// caller's master strip.
    pub fn process(&mut self) {
        for k in 0..self.order.len() {
            let idx = self.order[k];
            let dest_id = self.nodes[idx].output_to;
            let Some(dest_idx) = self.index_of(dest_id) else {
                continue;
            };
            debug_assert_ne!(dest_idx, idx);

            // Work on the node's buffers in place
            let block = self.block_len;
            let (gain_in, gain_out) = {
                let node = &self.nodes[idx];
                (node.input_gain, node.output_gain)
            };
            {
                let node = &mut self.nodes[idx];
                for i in 0..block {
                    node.in_l[i] *= gain_in;
                    node.in_r[i] *= gain_in;
                }
                // Split borrow: chain processes the same node's buffers
                let BusNode {
                    chain, in_l, in_r, ..
                } = node;
                chain.process(in_l, in_r);
                for i in 0..block {
                    node.in_l[i] *= gain_out;
                    node.in_r[i] *= gain_out;
                }
            }

            // Feed the destination
            let (src, dst) = if idx < dest_idx {
                let (a, b) = self.nodes.split_at_mut(dest_idx);
                (&a[idx], &mut b[0])
            } else {
                let (a, b) = self.nodes.split_at_mut(idx);
                (&b[0], &mut a[dest_idx])
            };
            for i in 0..block {
                dst.in_l[i] += src.in_l[i];
                dst.in_r[i] += src.in_r[i];
            }
        }
    }

    /// The master bus's accumulated input for this block
    pub fn master_input(&mut self) -> (&mut [Sample], &mut [Sample]) {
        let idx = self
            .index_of(MASTER_BUS_ID)
            .expect("master bus always exists");
        let node = &mut self.nodes[idx];
        (&mut node.in_l, &mut node.in_r)
    }

    pub fn reset(&mut self) {
        for node in &mut self.nodes {
            node.chain.reset();
        }
        self.clear_inputs();
    }
}
