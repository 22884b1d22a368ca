use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PgError, Result};
use crate::util::dna;

pub type NodeId = u64;

/// 节点链方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    #[inline]
    pub fn flip(self) -> Self {
        match self {
            Strand::Forward => Strand::Reverse,
            Strand::Reverse => Strand::Forward,
        }
    }

    #[inline]
    pub fn is_reverse(self) -> bool {
        self == Strand::Reverse
    }
}

/// 有向节点端（node + strand），表示以某个方向遍历节点
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Handle {
    pub node: NodeId,
    pub strand: Strand,
}

impl Handle {
    #[inline]
    pub fn new(node: NodeId, strand: Strand) -> Self {
        Self { node, strand }
    }

    #[inline]
    pub fn forward(node: NodeId) -> Self {
        Self::new(node, Strand::Forward)
    }

    #[inline]
    pub fn reverse(node: NodeId) -> Self {
        Self::new(node, Strand::Reverse)
    }

    #[inline]
    pub fn flip(self) -> Self {
        Self::new(self.node, self.strand.flip())
    }

    #[inline]
    pub fn is_reverse(self) -> bool {
        self.strand.is_reverse()
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.is_reverse() { '-' } else { '+' };
        write!(f, "{}{}", self.node, sign)
    }
}

/// 双向边：离开 `from` 后进入 `to`。
/// 边 (u,+)→(v,+) 隐含互补遍历 (v,-)→(u,-)。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub from: Handle,
    pub to: Handle,
}

impl Edge {
    pub fn new(from: Handle, to: Handle) -> Self {
        Self { from, to }
    }

    /// 互补方向的同一条边
    pub fn flip(self) -> Self {
        Self::new(self.to.flip(), self.from.flip())
    }

    /// 两种写法中较小者，用于去重
    pub fn canonical(self) -> Self {
        self.min(self.flip())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub seq: Vec<u8>,
}

/// 双向序列图。
///
/// - 节点以稳定 id 存放在 arena 中，序列只会在拆分时改变；
/// - 邻接表从有向节点端映射到目标节点端，始终在互补下对称；
/// - 具名路径记录已并入图中的序列，拆分节点时会同步改写。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    nodes: BTreeMap<NodeId, Node>,
    adj: BTreeMap<Handle, BTreeSet<Handle>>,
    paths: BTreeMap<String, Vec<Handle>>,
    version: u64,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// 单节点图，附带一条覆盖该节点的路径
    pub fn from_sequence(name: &str, seq: &[u8]) -> Result<Self> {
        let mut g = Self::new();
        let id = g.add_node(seq)?;
        g.add_path(name, &[Handle::forward(id)])?;
        Ok(g)
    }

    /// 每次修改都会递增；派生索引据此判断是否过期
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn total_len(&self) -> usize {
        self.nodes.values().map(|n| n.seq.len()).sum()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// 按 id 升序遍历节点
    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.values()
    }

    pub fn node_len(&self, id: NodeId) -> Option<usize> {
        self.nodes.get(&id).map(|n| n.seq.len())
    }

    /// 下一个未使用的节点 id
    pub fn next_id(&self) -> NodeId {
        self.nodes.keys().next_back().map_or(1, |&id| id + 1)
    }

    /// 按 handle 方向给出的序列（反向链为反向互补）
    pub fn sequence(&self, h: Handle) -> Option<Cow<'_, [u8]>> {
        let node = self.nodes.get(&h.node)?;
        Some(if h.is_reverse() {
            Cow::Owned(dna::revcomp(&node.seq))
        } else {
            Cow::Borrowed(&node.seq)
        })
    }

    /// handle 方向上第 offset 个碱基
    pub fn base(&self, h: Handle, offset: usize) -> Option<u8> {
        let seq = &self.nodes.get(&h.node)?.seq;
        if offset >= seq.len() {
            return None;
        }
        Some(if h.is_reverse() {
            dna::complement(seq[seq.len() - 1 - offset])
        } else {
            seq[offset]
        })
    }

    pub fn add_node(&mut self, seq: &[u8]) -> Result<NodeId> {
        let id = self.next_id();
        self.add_node_with_id(id, seq)
    }

    pub fn add_node_with_id(&mut self, id: NodeId, seq: &[u8]) -> Result<NodeId> {
        if self.nodes.contains_key(&id) {
            return Err(PgError::reference(format!("node id {} already exists", id)));
        }
        if seq.is_empty() {
            return Err(PgError::param(format!("node {} has an empty sequence", id)));
        }
        self.nodes.insert(id, Node { id, seq: dna::normalize_seq(seq) });
        self.version += 1;
        Ok(id)
    }

    pub fn add_edge(&mut self, from: Handle, to: Handle) -> Result<()> {
        for h in [from, to] {
            if !self.contains(h.node) {
                return Err(PgError::reference(format!(
                    "edge {} -> {} names unknown node {}",
                    from, to, h.node
                )));
            }
        }
        if !self.has_edge(from, to) {
            self.link(from, to);
            self.version += 1;
        }
        Ok(())
    }

    pub fn has_edge(&self, from: Handle, to: Handle) -> bool {
        self.adj.get(&from).is_some_and(|dsts| dsts.contains(&to))
    }

    /// 离开 h 之后可以进入的节点端
    pub fn neighbors(&self, h: Handle) -> impl Iterator<Item = Handle> + '_ {
        self.adj.get(&h).into_iter().flatten().copied()
    }

    /// 可以紧接在 h 之前的节点端
    pub fn predecessors(&self, h: Handle) -> impl Iterator<Item = Handle> + '_ {
        self.neighbors(h.flip()).map(Handle::flip)
    }

    pub fn degree(&self, h: Handle) -> usize {
        self.adj.get(&h).map_or(0, BTreeSet::len)
    }

    /// 所有边，每条只列出一次（规范方向）
    pub fn edges(&self) -> Vec<Edge> {
        let mut out: Vec<Edge> = self
            .adj
            .iter()
            .flat_map(|(&from, dsts)| dsts.iter().map(move |&to| Edge::new(from, to).canonical()))
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    fn link(&mut self, from: Handle, to: Handle) {
        self.adj.entry(from).or_default().insert(to);
        self.adj.entry(to.flip()).or_default().insert(from.flip());
    }

    fn unlink(&mut self, from: Handle, to: Handle) {
        for (a, b) in [(from, to), (to.flip(), from.flip())] {
            if let Some(dsts) = self.adj.get_mut(&a) {
                dsts.remove(&b);
                if dsts.is_empty() {
                    self.adj.remove(&a);
                }
            }
        }
    }

    /// 在 offset 处把节点拆成左右两半。
    ///
    /// 左半保留 `[0, offset)`，右半保留 `[offset, len)`；原节点左端的边改接到左半，
    /// 右端的边改接到右半，两半之间补一条内部边。只触碰与原节点相连的邻接项。
    /// 具名路径经过原节点的地方改为依次经过两半。
    pub fn split_node(&mut self, id: NodeId, offset: usize) -> Result<(NodeId, NodeId)> {
        let node = self
            .nodes
            .get(&id)
            .ok_or_else(|| PgError::reference(format!("cannot split unknown node {}", id)))?;
        let len = node.seq.len();
        if offset == 0 || offset >= len {
            return Err(PgError::param(format!(
                "split offset {} outside (0, {}) for node {}",
                offset, len, id
            )));
        }
        let left_seq = node.seq[..offset].to_vec();
        let right_seq = node.seq[offset..].to_vec();

        let touching: Vec<Edge> = [Handle::forward(id), Handle::reverse(id)]
            .into_iter()
            .flat_map(|h| self.neighbors(h).map(move |to| Edge::new(h, to)))
            .collect();
        for e in &touching {
            self.unlink(e.from, e.to);
        }

        let left = self.next_id();
        let right = left + 1;
        self.nodes.remove(&id);
        self.nodes.insert(left, Node { id: left, seq: left_seq });
        self.nodes.insert(right, Node { id: right, seq: right_seq });

        // leaving (id,+) exits through the right half, entering (id,+) enters the left half
        let remap_from = |h: Handle| match (h.node == id, h.strand) {
            (false, _) => h,
            (true, Strand::Forward) => Handle::forward(right),
            (true, Strand::Reverse) => Handle::reverse(left),
        };
        let remap_to = |h: Handle| match (h.node == id, h.strand) {
            (false, _) => h,
            (true, Strand::Forward) => Handle::forward(left),
            (true, Strand::Reverse) => Handle::reverse(right),
        };
        for e in touching {
            self.link(remap_from(e.from), remap_to(e.to));
        }
        self.link(Handle::forward(left), Handle::forward(right));

        for steps in self.paths.values_mut() {
            if !steps.iter().any(|h| h.node == id) {
                continue;
            }
            let mut rerouted = Vec::with_capacity(steps.len() + 1);
            for &h in steps.iter() {
                match (h.node == id, h.strand) {
                    (false, _) => rerouted.push(h),
                    (true, Strand::Forward) => {
                        rerouted.push(Handle::forward(left));
                        rerouted.push(Handle::forward(right));
                    }
                    (true, Strand::Reverse) => {
                        rerouted.push(Handle::reverse(right));
                        rerouted.push(Handle::reverse(left));
                    }
                }
            }
            *steps = rerouted;
        }

        self.version += 1;
        Ok((left, right))
    }

    /// 登记具名路径；相邻两步之间必须存在边
    pub fn add_path(&mut self, name: &str, steps: &[Handle]) -> Result<()> {
        if name.is_empty() {
            return Err(PgError::param("path name must not be empty"));
        }
        if self.paths.contains_key(name) {
            return Err(PgError::param(format!("path '{}' already exists", name)));
        }
        self.check_walk(steps)?;
        self.paths.insert(name.to_string(), steps.to_vec());
        self.version += 1;
        Ok(())
    }

    pub fn path(&self, name: &str) -> Option<&[Handle]> {
        self.paths.get(name).map(Vec::as_slice)
    }

    pub fn paths(&self) -> impl Iterator<Item = (&str, &[Handle])> + '_ {
        self.paths.iter().map(|(name, steps)| (name.as_str(), steps.as_slice()))
    }

    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    /// 路径拼出的序列
    pub fn path_sequence(&self, name: &str) -> Result<Vec<u8>> {
        let steps = self
            .paths
            .get(name)
            .ok_or_else(|| PgError::reference(format!("unknown path '{}'", name)))?;
        self.walk_sequence(steps)
    }

    pub fn walk_sequence(&self, steps: &[Handle]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for &h in steps {
            let seq = self
                .sequence(h)
                .ok_or_else(|| PgError::reference(format!("walk visits unknown node {}", h.node)))?;
            out.extend_from_slice(&seq);
        }
        Ok(out)
    }

    fn check_walk(&self, steps: &[Handle]) -> Result<()> {
        if let Some(h) = steps.iter().find(|h| !self.contains(h.node)) {
            return Err(PgError::reference(format!("walk visits unknown node {}", h.node)));
        }
        for pair in steps.windows(2) {
            if !self.has_edge(pair[0], pair[1]) {
                return Err(PgError::inconsistent(format!(
                    "walk steps {} -> {} are not connected",
                    pair[0], pair[1]
                )));
            }
        }
        Ok(())
    }

    /// 检查节点非空、邻接对称、无悬空引用、路径连续
    pub fn validate(&self) -> Result<()> {
        for (&id, node) in &self.nodes {
            if node.id != id {
                return Err(PgError::inconsistent(format!("node {} is stored under id {}", node.id, id)));
            }
            if node.seq.is_empty() {
                return Err(PgError::inconsistent(format!("node {} has an empty sequence", id)));
            }
        }
        for (&from, dsts) in &self.adj {
            if !self.contains(from.node) {
                return Err(PgError::inconsistent(format!("adjacency for unknown node {}", from.node)));
            }
            for &to in dsts {
                if !self.contains(to.node) {
                    return Err(PgError::inconsistent(format!(
                        "edge {} -> {} points at unknown node",
                        from, to
                    )));
                }
                if !self.has_edge(to.flip(), from.flip()) {
                    return Err(PgError::inconsistent(format!(
                        "edge {} -> {} has no complement",
                        from, to
                    )));
                }
            }
        }
        for (name, steps) in &self.paths {
            self.check_walk(steps)
                .map_err(|e| PgError::inconsistent(format!("path '{}': {}", name, e)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bubble() -> Graph {
        // 1 -> {2, 3} -> 4
        let mut g = Graph::new();
        for seq in [b"ACGT".as_slice(), b"A", b"C", b"TTGA"] {
            g.add_node(seq).unwrap();
        }
        g.add_edge(Handle::forward(1), Handle::forward(2)).unwrap();
        g.add_edge(Handle::forward(1), Handle::forward(3)).unwrap();
        g.add_edge(Handle::forward(2), Handle::forward(4)).unwrap();
        g.add_edge(Handle::forward(3), Handle::forward(4)).unwrap();
        g
    }

    #[test]
    fn ids_are_allocated_sequentially() {
        let g = bubble();
        assert_eq!(g.node(1).unwrap().seq, b"ACGT");
        assert_eq!(g.next_id(), 5);
        assert_eq!(g.edge_count(), 4);
    }

    #[test]
    fn explicit_id_collision_is_rejected() {
        let mut g = bubble();
        assert!(matches!(g.add_node_with_id(2, b"GG"), Err(PgError::InvalidReference(_))));
        assert_eq!(g.add_node_with_id(10, b"GG").unwrap(), 10);
    }

    #[test]
    fn edge_to_unknown_node_is_rejected() {
        let mut g = bubble();
        let before = g.clone();
        let err = g.add_edge(Handle::forward(1), Handle::forward(99));
        assert!(matches!(err, Err(PgError::InvalidReference(_))));
        assert_eq!(g, before);
    }

    #[test]
    fn edges_are_bidirected() {
        let g = bubble();
        let succ: Vec<Handle> = g.neighbors(Handle::forward(1)).collect();
        assert_eq!(succ, vec![Handle::forward(2), Handle::forward(3)]);
        let back: Vec<Handle> = g.neighbors(Handle::reverse(4)).collect();
        assert_eq!(back, vec![Handle::reverse(2), Handle::reverse(3)]);
        let pred: Vec<Handle> = g.predecessors(Handle::forward(4)).collect();
        assert_eq!(pred, vec![Handle::forward(2), Handle::forward(3)]);
        g.validate().unwrap();
    }

    #[test]
    fn reverse_handle_spells_reverse_complement() {
        let g = bubble();
        assert_eq!(&*g.sequence(Handle::reverse(4)).unwrap(), b"TCAA");
        assert_eq!(g.base(Handle::reverse(1), 0), Some(b'A'));
        assert_eq!(g.base(Handle::reverse(1), 3), Some(b'T'));
        assert_eq!(g.base(Handle::forward(1), 4), None);
    }

    #[test]
    fn split_rewires_both_ends() {
        let mut g = bubble();
        g.add_path("ref", &[Handle::forward(1), Handle::forward(2), Handle::forward(4)])
            .unwrap();
        let (l, r) = g.split_node(4, 2).unwrap();
        assert!(!g.contains(4));
        assert_eq!(g.node(l).unwrap().seq, b"TT");
        assert_eq!(g.node(r).unwrap().seq, b"GA");
        assert!(g.has_edge(Handle::forward(2), Handle::forward(l)));
        assert!(g.has_edge(Handle::forward(3), Handle::forward(l)));
        assert!(g.has_edge(Handle::forward(l), Handle::forward(r)));
        assert!(g.has_edge(Handle::reverse(r), Handle::reverse(l)));
        assert_eq!(g.path("ref").unwrap().len(), 4);
        assert_eq!(g.path_sequence("ref").unwrap(), b"ACGTATTGA");
        g.validate().unwrap();
    }

    #[test]
    fn split_keeps_reverse_traversals() {
        let mut g = Graph::new();
        let a = g.add_node(b"AAAC").unwrap();
        let b = g.add_node(b"GGTT").unwrap();
        // leave a forward, enter b reversed
        g.add_edge(Handle::forward(a), Handle::reverse(b)).unwrap();
        g.add_path("p", &[Handle::forward(a), Handle::reverse(b)]).unwrap();
        let before = g.path_sequence("p").unwrap();
        let (l, r) = g.split_node(b, 1).unwrap();
        assert_eq!(g.path("p").unwrap(), &[Handle::forward(a), Handle::reverse(r), Handle::reverse(l)]);
        assert_eq!(g.path_sequence("p").unwrap(), before);
        assert!(g.has_edge(Handle::forward(a), Handle::reverse(r)));
        g.validate().unwrap();
    }

    #[test]
    fn split_handles_self_loop() {
        let mut g = Graph::new();
        let a = g.add_node(b"ACGT").unwrap();
        g.add_edge(Handle::forward(a), Handle::forward(a)).unwrap();
        let (l, r) = g.split_node(a, 2).unwrap();
        assert!(g.has_edge(Handle::forward(r), Handle::forward(l)));
        assert!(g.has_edge(Handle::forward(l), Handle::forward(r)));
        assert_eq!(g.edge_count(), 2);
        g.validate().unwrap();
    }

    #[test]
    fn split_rejects_bad_offsets() {
        let mut g = bubble();
        assert!(matches!(g.split_node(1, 0), Err(PgError::InvalidParameter(_))));
        assert!(matches!(g.split_node(1, 4), Err(PgError::InvalidParameter(_))));
        assert!(matches!(g.split_node(42, 1), Err(PgError::InvalidReference(_))));
    }

    #[test]
    fn validate_rejects_empty_node() {
        let mut g = bubble();
        g.validate().unwrap();
        // a snapshot can carry nodes that add_node would never create
        g.nodes.insert(7, Node { id: 7, seq: Vec::new() });
        assert!(matches!(g.validate(), Err(PgError::InconsistentGraph(_))));
    }

    #[test]
    fn disconnected_path_is_rejected() {
        let mut g = bubble();
        let err = g.add_path("bad", &[Handle::forward(2), Handle::forward(3)]);
        assert!(matches!(err, Err(PgError::InconsistentGraph(_))));
        assert_eq!(g.path_count(), 0);
    }
}
