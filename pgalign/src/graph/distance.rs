use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use super::model::{Graph, Handle, NodeId};

/// 节点端之间的距离表。
///
/// `get(from, to)` 为离开 `from` 之后、进入 `to` 之前经过的碱基数；
/// 直接相邻为 0。没有条目表示该转移不被允许。
#[derive(Debug, Clone, Default)]
pub struct DistanceTable {
    entries: HashMap<(Handle, Handle), usize>,
}

impl DistanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入一条距离，已有更短距离时保留较短者
    pub fn insert(&mut self, from: Handle, to: Handle, dist: usize) {
        self.entries
            .entry((from, to))
            .and_modify(|d| *d = (*d).min(dist))
            .or_insert(dist);
    }

    /// 正向链上 u → v 的距离
    pub fn insert_nodes(&mut self, u: NodeId, v: NodeId, dist: usize) {
        self.insert(Handle::forward(u), Handle::forward(v), dist);
    }

    pub fn get(&self, from: Handle, to: Handle) -> Option<usize> {
        self.entries.get(&(from, to)).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 对图中每个节点端做一次有界最短路，距离不超过 limit 的都记入表中
    pub fn from_graph(graph: &Graph, limit: usize) -> Self {
        let mut table = Self::new();
        for node in graph.nodes() {
            for from in [Handle::forward(node.id), Handle::reverse(node.id)] {
                for (to, d) in shortest_gaps(graph, from, limit) {
                    table.insert(from, to, d);
                }
            }
        }
        table
    }
}

/// 从 `from` 出发的有界 Dijkstra：返回每个可达节点端的最短间隔碱基数
pub fn shortest_gaps(graph: &Graph, from: Handle, limit: usize) -> HashMap<Handle, usize> {
    let mut best: HashMap<Handle, usize> = HashMap::new();
    let mut heap = BinaryHeap::new();
    for h in graph.neighbors(from) {
        best.insert(h, 0);
        heap.push(Reverse((0usize, h)));
    }
    while let Some(Reverse((d, h))) = heap.pop() {
        if best.get(&h).is_some_and(|&b| b < d) {
            continue;
        }
        let Some(len) = graph.node_len(h.node) else {
            continue;
        };
        let nd = d + len;
        if nd > limit {
            continue;
        }
        for next in graph.neighbors(h) {
            if best.get(&next).map_or(true, |&b| nd < b) {
                best.insert(next, nd);
                heap.push(Reverse((nd, next)));
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_graph() -> Graph {
        // 1(4bp) -> 2(3bp) -> 3(2bp), plus shortcut 1 -> 3
        let mut g = Graph::new();
        g.add_node(b"ACGT").unwrap();
        g.add_node(b"GGG").unwrap();
        g.add_node(b"TT").unwrap();
        g.add_edge(Handle::forward(1), Handle::forward(2)).unwrap();
        g.add_edge(Handle::forward(2), Handle::forward(3)).unwrap();
        g.add_edge(Handle::forward(1), Handle::forward(3)).unwrap();
        g
    }

    #[test]
    fn adjacent_handles_are_zero_apart() {
        let g = chain_graph();
        let d = shortest_gaps(&g, Handle::forward(1), 100);
        assert_eq!(d.get(&Handle::forward(2)), Some(&0));
        assert_eq!(d.get(&Handle::forward(3)), Some(&0));
    }

    #[test]
    fn distance_counts_intermediate_bases() {
        let g = chain_graph();
        let d = shortest_gaps(&g, Handle::reverse(3), 100);
        assert_eq!(d.get(&Handle::reverse(2)), Some(&0));
        assert_eq!(d.get(&Handle::reverse(1)), Some(&0));
        let mut g2 = chain_graph();
        let extra = g2.add_node(b"CC").unwrap();
        g2.add_edge(Handle::forward(3), Handle::forward(extra)).unwrap();
        let d2 = shortest_gaps(&g2, Handle::forward(2), 100);
        assert_eq!(d2.get(&Handle::forward(extra)), Some(&2));
    }

    #[test]
    fn limit_bounds_search() {
        let mut g = chain_graph();
        let extra = g.add_node(b"CC").unwrap();
        g.add_edge(Handle::forward(3), Handle::forward(extra)).unwrap();
        let d = shortest_gaps(&g, Handle::forward(2), 1);
        assert!(d.contains_key(&Handle::forward(3)));
        assert!(!d.contains_key(&Handle::forward(extra)));
    }

    #[test]
    fn table_from_graph_keeps_minimum() {
        let g = chain_graph();
        let t = DistanceTable::from_graph(&g, 10);
        assert_eq!(t.get(Handle::forward(1), Handle::forward(3)), Some(0));
        assert_eq!(t.get(Handle::forward(3), Handle::forward(1)), None);
        let mut t2 = DistanceTable::new();
        t2.insert_nodes(1, 2, 7);
        t2.insert_nodes(1, 2, 3);
        assert_eq!(t2.get(Handle::forward(1), Handle::forward(2)), Some(3));
    }
}
