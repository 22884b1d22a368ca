use log::{debug, warn};

use super::edit::{Edit, GraphPos};
use super::seed::Seed;
use super::sw::{align_free_end, align_global, DpBuffer, DpResult, ScoreParams};
use crate::error::{PgError, Result};
use crate::graph::{Graph, Handle};
use crate::util::dna;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtendOpt {
    /// 种子长度
    pub k: usize,
    /// 锚点之间图上路径长度可超出 query 间隔的碱基数；也是两端延伸的余量和 DP 带宽
    pub max_gap_diff: usize,
    /// 每段最多枚举的图上路径数
    pub max_walks: usize,
}

impl Default for ExtendOpt {
    fn default() -> Self {
        Self { k: 3, max_gap_diff: 50, max_walks: 256 }
    }
}

/// 图上一条候选路径展开后的参考序列及每个碱基的位置
#[derive(Debug, Clone, Default)]
struct Walk {
    pos: Vec<GraphPos>,
    bases: Vec<u8>,
}

impl Walk {
    fn push_span(&mut self, graph: &Graph, h: Handle, from: usize, to: usize) {
        for offset in from..to {
            if let Some(b) = graph.base(h, offset) {
                self.pos.push(GraphPos::new(h, offset));
                self.bases.push(b);
            }
        }
    }

    fn truncate(&mut self, len: usize) {
        self.pos.truncate(len);
        self.bases.truncate(len);
    }

    fn len(&self) -> usize {
        self.pos.len()
    }
}

/// 链 → 逐碱基编辑脚本。
///
/// 种子覆盖的区间直接输出 Match；锚点之间以及两端在图上枚举有界路径，
/// 对每条路径做仿射间隙 DP，取得分最高者。
pub struct Aligner<'g> {
    graph: &'g Graph,
    params: ScoreParams,
    opt: ExtendOpt,
}

impl<'g> Aligner<'g> {
    pub fn new(graph: &'g Graph, params: ScoreParams, opt: ExtendOpt) -> Result<Self> {
        if opt.k == 0 {
            return Err(PgError::param("k must be >= 1"));
        }
        if opt.max_walks == 0 {
            return Err(PgError::param("max_walks must be >= 1"));
        }
        Ok(Self { graph, params, opt })
    }

    pub fn align(&self, query: &[u8], chain: &[Seed]) -> Result<Vec<Edit>> {
        let q = dna::normalize_seq(query);
        if chain.is_empty() {
            warn!("empty chain: {}bp query left unanchored", q.len());
            return Ok((0..q.len()).map(Edit::insertion).collect());
        }
        self.check_chain(&q, chain)?;

        let k = self.opt.k;
        let mut buf = DpBuffer::new();
        let mut edits = Vec::with_capacity(q.len());

        let first = chain[0];
        self.extend_left(&q[..first.qpos], GraphPos::new(first.handle, first.npos), &mut buf, &mut edits);
        self.emit_seed(&first, 0, &mut edits);
        let mut cur_q = first.qpos + k;
        let mut cur = GraphPos::new(first.handle, first.npos + k);

        for seed in &chain[1..] {
            if seed.qpos < cur_q {
                let skip = cur_q - seed.qpos;
                if seed.handle != cur.handle || seed.npos + skip != cur.offset {
                    return Err(PgError::no_path(format!(
                        "seed at query {} overlaps its predecessor off the diagonal",
                        seed.qpos
                    )));
                }
                self.emit_seed(seed, skip, &mut edits);
            } else {
                let to = GraphPos::new(seed.handle, seed.npos);
                self.bridge(&q[cur_q..seed.qpos], cur_q, cur, to, &mut buf, &mut edits)?;
                self.emit_seed(seed, 0, &mut edits);
            }
            cur_q = seed.qpos + k;
            cur = GraphPos::new(seed.handle, seed.npos + k);
        }

        self.extend_right(&q[cur_q..], cur_q, cur, &mut buf, &mut edits);
        debug!("extension: {}bp query -> {} edits", q.len(), edits.len());
        Ok(edits)
    }

    fn check_chain(&self, q: &[u8], chain: &[Seed]) -> Result<()> {
        let k = self.opt.k;
        for pair in chain.windows(2) {
            if pair[1].qpos <= pair[0].qpos {
                return Err(PgError::param(format!(
                    "chain is not increasing in query offset at {}",
                    pair[1].qpos
                )));
            }
        }
        for s in chain {
            if s.qpos + k > q.len() {
                return Err(PgError::param(format!("seed at query {} runs past the query", s.qpos)));
            }
            let len = self
                .graph
                .node_len(s.node())
                .ok_or_else(|| PgError::reference(format!("seed names unknown node {}", s.node())))?;
            if s.npos + k > len {
                return Err(PgError::reference(format!(
                    "seed at node {} offset {} runs past node end",
                    s.node(),
                    s.npos
                )));
            }
            let agrees = (0..k).all(|t| self.graph.base(s.handle, s.npos + t) == Some(q[s.qpos + t]));
            if !agrees {
                return Err(PgError::reference(format!(
                    "seed at query {} does not match node {} offset {}",
                    s.qpos,
                    s.node(),
                    s.npos
                )));
            }
        }
        Ok(())
    }

    fn emit_seed(&self, seed: &Seed, skip: usize, out: &mut Vec<Edit>) {
        for t in skip..self.opt.k {
            out.push(Edit::matched(seed.qpos + t, GraphPos::new(seed.handle, seed.npos + t)));
        }
    }

    /// 两个锚点之间：query 段与 from→to 之间的图上路径做全局对齐
    fn bridge(
        &self,
        qseg: &[u8],
        q_off: usize,
        from: GraphPos,
        to: GraphPos,
        buf: &mut DpBuffer,
        out: &mut Vec<Edit>,
    ) -> Result<()> {
        let max_len = qseg.len() + self.opt.max_gap_diff;
        let walks = self.walks_between(from, to, max_len);
        let (walk, res) = self
            .best_walk(&walks, |w| align_global(qseg, &w.bases, self.params, self.opt.max_gap_diff, buf))
            .ok_or_else(|| PgError::no_path(format!("no graph path from {} to {}", from, to)))?;
        self.emit_ops(&res.ops, qseg, |i| q_off + i, &walk.pos, out);
        Ok(())
    }

    /// 第一个锚点之前：沿前驱方向反向展开，query 末端固定、图上起点自由
    fn extend_left(&self, qseg: &[u8], to: GraphPos, buf: &mut DpBuffer, out: &mut Vec<Edit>) {
        if qseg.is_empty() {
            return;
        }
        let rev_q: Vec<u8> = qseg.iter().rev().copied().collect();
        let max_len = qseg.len() + self.opt.max_gap_diff;
        let walks = self.walks_backward(to, max_len);
        let band = self.opt.max_gap_diff;
        let Some((walk, res)) =
            self.best_walk(&walks, |w| Some(align_free_end(&rev_q, &w.bases, self.params, band, buf)))
        else {
            out.extend((0..qseg.len()).map(Edit::insertion));
            return;
        };
        let n = qseg.len();
        let mut edits = Vec::with_capacity(res.ops.len());
        self.emit_ops(&res.ops, &rev_q, |i| n - 1 - i, &walk.pos, &mut edits);
        out.extend(edits.into_iter().rev());
    }

    /// 最后一个锚点之后：沿后继方向展开，图上终点自由
    fn extend_right(&self, qseg: &[u8], q_off: usize, from: GraphPos, buf: &mut DpBuffer, out: &mut Vec<Edit>) {
        if qseg.is_empty() {
            return;
        }
        let max_len = qseg.len() + self.opt.max_gap_diff;
        let walks = self.walks_forward(from, max_len);
        let band = self.opt.max_gap_diff;
        let Some((walk, res)) =
            self.best_walk(&walks, |w| Some(align_free_end(qseg, &w.bases, self.params, band, buf)))
        else {
            out.extend((q_off..q_off + qseg.len()).map(Edit::insertion));
            return;
        };
        self.emit_ops(&res.ops, qseg, |i| q_off + i, &walk.pos, out);
    }

    /// 得分最高的路径；同分取先枚举到的。带外不可达的路径跳过
    fn best_walk<'w>(
        &self,
        walks: &'w [Walk],
        mut run: impl FnMut(&Walk) -> Option<DpResult>,
    ) -> Option<(&'w Walk, DpResult)> {
        let mut best: Option<(&Walk, DpResult)> = None;
        for w in walks {
            let Some(res) = run(w) else { continue };
            if best.as_ref().map_or(true, |(_, b)| res.score > b.score) {
                best = Some((w, res));
            }
        }
        best
    }

    /// ops 中 query 下标 i 映射到原 query 偏移 qpos(i)，参考下标 j 映射到 pos[j]
    fn emit_ops(
        &self,
        ops: &[char],
        qbases: &[u8],
        qpos: impl Fn(usize) -> usize,
        pos: &[GraphPos],
        out: &mut Vec<Edit>,
    ) {
        let (mut i, mut j) = (0usize, 0usize);
        for &op in ops {
            match op {
                'M' => {
                    let p = pos[j];
                    if self.graph.base(p.handle, p.offset) == Some(qbases[i]) {
                        out.push(Edit::matched(qpos(i), p));
                    } else {
                        out.push(Edit::mismatch(qpos(i), p));
                    }
                    i += 1;
                    j += 1;
                }
                'I' => {
                    out.push(Edit::insertion(qpos(i)));
                    i += 1;
                }
                _ => {
                    out.push(Edit::deletion(pos[j]));
                    j += 1;
                }
            }
        }
    }

    /// from（含）到 to（不含）之间的所有有界路径
    fn walks_between(&self, from: GraphPos, to: GraphPos, max_len: usize) -> Vec<Walk> {
        let mut out = Vec::new();
        if from.handle == to.handle && to.offset >= from.offset {
            let mut w = Walk::default();
            w.push_span(self.graph, from.handle, from.offset, to.offset);
            out.push(w);
        }
        let Some(len) = self.graph.node_len(from.handle.node) else {
            return out;
        };
        let mut prefix = Walk::default();
        prefix.push_span(self.graph, from.handle, from.offset, len);
        if prefix.len() <= max_len {
            self.dfs_between(from.handle, to, max_len, &mut prefix, &mut out);
        }
        out
    }

    fn dfs_between(&self, at: Handle, to: GraphPos, max_len: usize, acc: &mut Walk, out: &mut Vec<Walk>) {
        let next: Vec<Handle> = self.graph.neighbors(at).collect();
        for h in next {
            if out.len() >= self.opt.max_walks {
                return;
            }
            if h == to.handle && acc.len() + to.offset <= max_len {
                let mut w = acc.clone();
                w.push_span(self.graph, h, 0, to.offset);
                out.push(w);
            }
            let len = self.graph.node_len(h.node).unwrap_or(0);
            if acc.len() + len <= max_len {
                let mark = acc.len();
                acc.push_span(self.graph, h, 0, len);
                self.dfs_between(h, to, max_len, acc, out);
                acc.truncate(mark);
            }
        }
    }

    /// 从 from 向后继方向展开的所有路径，每条截断到 max_len
    fn walks_forward(&self, from: GraphPos, max_len: usize) -> Vec<Walk> {
        let len = self.graph.node_len(from.handle.node).unwrap_or(0);
        let mut acc = Walk::default();
        acc.push_span(self.graph, from.handle, from.offset, len);
        let mut out = Vec::new();
        self.dfs_open(from.handle, max_len, &mut acc, &mut out, false);
        out
    }

    /// 从 to 之前向前驱方向展开的所有路径（按离开锚点的顺序排列）
    fn walks_backward(&self, to: GraphPos, max_len: usize) -> Vec<Walk> {
        let mut acc = Walk::default();
        self.push_backward(&mut acc, to.handle, to.offset);
        let mut out = Vec::new();
        self.dfs_open(to.handle, max_len, &mut acc, &mut out, true);
        out
    }

    fn push_backward(&self, acc: &mut Walk, h: Handle, end: usize) {
        for offset in (0..end).rev() {
            if let Some(b) = self.graph.base(h, offset) {
                acc.pos.push(GraphPos::new(h, offset));
                acc.bases.push(b);
            }
        }
    }

    fn dfs_open(&self, at: Handle, max_len: usize, acc: &mut Walk, out: &mut Vec<Walk>, backward: bool) {
        if out.len() >= self.opt.max_walks {
            return;
        }
        if acc.len() >= max_len {
            let mut w = acc.clone();
            w.truncate(max_len);
            out.push(w);
            return;
        }
        let next: Vec<Handle> = if backward {
            self.graph.predecessors(at).collect()
        } else {
            self.graph.neighbors(at).collect()
        };
        if next.is_empty() {
            out.push(acc.clone());
            return;
        }
        for h in next {
            if out.len() >= self.opt.max_walks {
                return;
            }
            let mark = acc.len();
            let len = self.graph.node_len(h.node).unwrap_or(0);
            if backward {
                self.push_backward(acc, h, len);
            } else {
                acc.push_span(self.graph, h, 0, len);
            }
            self.dfs_open(h, max_len, acc, out, backward);
            acc.truncate(mark);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::edit::{check_script, EditOp, EditStats};
    use crate::graph::NodeId;

    fn seed(qpos: usize, node: NodeId, npos: usize) -> Seed {
        Seed { qpos, handle: Handle::forward(node), npos }
    }

    fn aligner(g: &Graph, k: usize) -> Aligner<'_> {
        Aligner::new(g, ScoreParams::default(), ExtendOpt { k, max_gap_diff: 10, max_walks: 64 }).unwrap()
    }

    fn qpositions(edits: &[Edit]) -> Vec<usize> {
        edits.iter().filter_map(|e| e.qpos).collect()
    }

    fn bubble() -> Graph {
        // 1: AAAACC -> {2: G, 3: T} -> 4: CCAAAA
        let mut g = Graph::new();
        for seq in [b"AAAACC".as_slice(), b"G", b"T", b"CCAAAA"] {
            g.add_node(seq).unwrap();
        }
        g.add_edge(Handle::forward(1), Handle::forward(2)).unwrap();
        g.add_edge(Handle::forward(1), Handle::forward(3)).unwrap();
        g.add_edge(Handle::forward(2), Handle::forward(4)).unwrap();
        g.add_edge(Handle::forward(3), Handle::forward(4)).unwrap();
        g
    }

    #[test]
    fn exact_path_is_all_matches() {
        let g = Graph::from_sequence("ref", b"ACGTACGT").unwrap();
        let a = aligner(&g, 3);
        let chain = vec![seed(0, 1, 0), seed(1, 1, 1), seed(2, 1, 2), seed(4, 1, 4)];
        let edits = a.align(b"ACGTACGT", &chain).unwrap();
        assert_eq!(edits.len(), 8);
        assert!(edits.iter().all(|e| e.op == EditOp::Match));
        assert_eq!(qpositions(&edits), (0..8).collect::<Vec<_>>());
        for (i, e) in edits.iter().enumerate() {
            assert_eq!(e.pos, Some(GraphPos::new(Handle::forward(1), i)));
        }
    }

    #[test]
    fn bridge_picks_matching_branch() {
        let g = bubble();
        let a = aligner(&g, 4);
        // query takes the T branch
        let chain = vec![seed(0, 1, 0), seed(7, 4, 0)];
        let edits = a.align(b"AAAACCTCCAAAA", &chain).unwrap();
        let s = EditStats::of(&edits);
        assert_eq!(s.nm(), 0);
        assert_eq!(edits.len(), 13);
        assert_eq!(edits[6].pos, Some(GraphPos::new(Handle::forward(3), 0)));
    }

    #[test]
    fn novel_base_becomes_mismatch() {
        let g = bubble();
        let a = aligner(&g, 4);
        let edits = a.align(b"AAAACCACCAAAA", &[seed(0, 1, 0), seed(7, 4, 0)]).unwrap();
        let s = EditStats::of(&edits);
        assert_eq!((s.matches, s.mismatches), (12, 1));
        assert_eq!(edits[6].op, EditOp::Mismatch);
    }

    #[test]
    fn insertion_between_anchors() {
        let g = bubble();
        let a = aligner(&g, 4);
        let edits = a.align(b"AAAACCGGGCCAAAA", &[seed(0, 1, 0), seed(9, 4, 0)]).unwrap();
        let s = EditStats::of(&edits);
        assert_eq!(s.insertions, 2);
        assert_eq!(s.matches, 13);
        assert_eq!(qpositions(&edits), (0..15).collect::<Vec<_>>());
    }

    #[test]
    fn deletion_between_anchors() {
        let g = Graph::from_sequence("ref", b"ACGTACGTTTGCA").unwrap();
        let a = aligner(&g, 4);
        // drop the "TT" at 8..10
        let edits = a.align(b"ACGTACGTGCA", &[seed(0, 1, 0), seed(7, 1, 9)]).unwrap();
        let s = EditStats::of(&edits);
        assert_eq!(s.deletions, 2);
        assert_eq!(s.matches, 11);
    }

    #[test]
    fn ends_extend_into_neighbours() {
        let g = bubble();
        let a = aligner(&g, 3);
        // anchor only on node 4; both flanks come from DP
        let edits = a.align(b"AACCGCCAA", &[seed(5, 4, 0)]).unwrap();
        let s = EditStats::of(&edits);
        assert_eq!(s.nm(), 0);
        assert_eq!(edits.first().unwrap().pos, Some(GraphPos::new(Handle::forward(1), 2)));
        assert_eq!(edits.last().unwrap().pos, Some(GraphPos::new(Handle::forward(4), 3)));
    }

    fn random_bases(len: usize, seed: u32) -> Vec<u8> {
        let mut x = seed;
        (0..len)
            .map(|_| {
                x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                b"ACGT"[(x >> 16) as usize % 4]
            })
            .collect()
    }

    #[test]
    fn long_flank_is_aligned_within_band() {
        let reference = random_bases(3_000, 11);
        let g = Graph::from_sequence("ref", &reference).unwrap();
        let mut query = reference[..2_000].to_vec();
        for p in [500, 1_500] {
            query[p] = if query[p] == b'A' { b'C' } else { b'A' };
        }
        let edits = aligner(&g, 4).align(&query, &[seed(1_990, 1, 1_990)]).unwrap();
        check_script(&edits, query.len()).unwrap();
        let s = EditStats::of(&edits);
        assert_eq!((s.matches, s.mismatches, s.nm()), (1_998, 2, 2));
        assert_eq!(edits[0].pos, Some(GraphPos::new(Handle::forward(1), 0)));
    }

    #[test]
    fn flank_past_graph_tip_ends_in_insertions() {
        let g = Graph::from_sequence("ref", b"TTTTGATTACAGG").unwrap();
        let query = [[b'C'; 16].as_slice(), b"TTTTGATTACAGG"].concat();
        // 左端 20 个碱基，图上只剩 4 个，超出带宽 10
        let edits = aligner(&g, 4).align(&query, &[seed(20, 1, 4)]).unwrap();
        let s = EditStats::of(&edits);
        assert_eq!((s.insertions, s.matches, s.nm()), (16, 13, 16));
        assert_eq!(qpositions(&edits), (0..29).collect::<Vec<_>>());
        assert_eq!(edits[16].pos, Some(GraphPos::new(Handle::forward(1), 0)));
    }

    #[test]
    fn reverse_strand_alignment() {
        let g = Graph::from_sequence("ref", b"AAACCCGGGT").unwrap();
        let a = aligner(&g, 4);
        let query = dna::revcomp(b"AAACCCGGGT");
        let chain = vec![Seed { qpos: 2, handle: Handle::reverse(1), npos: 2 }];
        let edits = a.align(&query, &chain).unwrap();
        assert_eq!(edits.len(), 10);
        assert!(edits.iter().all(|e| e.op == EditOp::Match));
        assert!(edits.iter().all(|e| e.pos.unwrap().handle.is_reverse()));
    }

    #[test]
    fn empty_chain_is_all_insertions() {
        let g = bubble();
        let edits = aligner(&g, 3).align(b"GATTACA", &[]).unwrap();
        assert_eq!(edits.len(), 7);
        assert!(edits.iter().all(|e| e.op == EditOp::Insertion));
    }

    #[test]
    fn disconnected_anchors_have_no_path() {
        let mut g = bubble();
        g.add_node(b"GGGGGG").unwrap();
        let a = aligner(&g, 4);
        let err = a.align(b"AAAACCGGGG", &[seed(0, 1, 0), seed(6, 5, 0)]);
        assert!(matches!(err, Err(PgError::NoPath(_))));
    }

    #[test]
    fn bad_chains_are_rejected() {
        let g = bubble();
        let a = aligner(&g, 3);
        assert!(matches!(
            a.align(b"AAAACC", &[seed(2, 1, 2), seed(1, 1, 1)]),
            Err(PgError::InvalidParameter(_))
        ));
        assert!(matches!(a.align(b"AAAACC", &[seed(0, 9, 0)]), Err(PgError::InvalidReference(_))));
        assert!(matches!(a.align(b"CCCCCC", &[seed(0, 1, 0)]), Err(PgError::InvalidReference(_))));
    }
}
