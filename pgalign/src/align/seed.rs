use std::collections::HashMap;

use log::debug;
use rayon::prelude::*;

use crate::error::{PgError, Result};
use crate::graph::{Graph, Handle, NodeId};
use crate::util::dna;

/// 种子：query 上 `qpos` 起、节点端 `handle` 上 `npos` 起的长度为 k 的精确匹配。
///
/// 排序依次按 query 偏移、节点 id（及方向）、节点内偏移，保证输出确定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Seed {
    pub qpos: usize,
    pub handle: Handle,
    pub npos: usize,
}

impl Seed {
    pub fn node(&self) -> NodeId {
        self.handle.node
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedOpt {
    /// 种子长度
    pub k: usize,
    /// minimizer 窗口内的 k-mer 个数
    pub w: usize,
    /// 同时索引节点序列的反向互补
    pub index_reverse: bool,
}

impl Default for SeedOpt {
    fn default() -> Self {
        Self { k: 3, w: 5, index_reverse: false }
    }
}

impl SeedOpt {
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(PgError::param("k must be >= 1"));
        }
        if self.w == 0 {
            return Err(PgError::param("w must be >= 1"));
        }
        Ok(())
    }
}

/// 返回 seq 中所有 (w, k) minimizer 的起始位置（升序、去重）。
///
/// 每个由 w 个连续 k-mer 起点组成的窗口里，字典序最小的 k-mer 被选中；
/// 并列最小的位置全部保留，这样同一窗口内容在任何上下文中选出的位置一致。
/// k-mer 数不足 w 时整条序列视为一个窗口；含非 ACGT 字符的 k-mer 不参与。
pub fn minimizer_positions(seq: &[u8], k: usize, w: usize) -> Vec<usize> {
    if k == 0 || w == 0 || seq.len() < k {
        return Vec::new();
    }
    let n_kmers = seq.len() - k + 1;
    let valid: Vec<bool> = (0..n_kmers)
        .map(|i| seq[i..i + k].iter().all(|&b| dna::is_acgt(b)))
        .collect();
    let win = w.min(n_kmers);

    let mut out = Vec::new();
    for start in 0..=(n_kmers - win) {
        let window = start..start + win;
        let min = window
            .clone()
            .filter(|&i| valid[i])
            .map(|i| &seq[i..i + k])
            .min();
        if let Some(min) = min {
            out.extend(window.filter(|&i| valid[i] && &seq[i..i + k] == min));
        }
    }
    out.sort_unstable();
    out.dedup();
    out
}

/// 基于 minimizer 的 k-mer 索引。
///
/// 索引绑定在借用的图快照上：只要 `Seeder` 存活，图就不能被修改；
/// 图经过增补后得到的是新版本，需要重新构建。
pub struct Seeder<'g> {
    graph: &'g Graph,
    opt: SeedOpt,
    index: HashMap<Vec<u8>, Vec<(Handle, usize)>>,
    version: u64,
}

impl<'g> Seeder<'g> {
    pub fn new(graph: &'g Graph, opt: SeedOpt) -> Result<Self> {
        opt.validate()?;

        let nodes: Vec<_> = graph.nodes().collect();
        let per_node: Vec<Vec<(Handle, usize, Vec<u8>)>> = nodes
            .par_iter()
            .map(|node| {
                let mut hits = Vec::new();
                let mut strands = vec![(Handle::forward(node.id), node.seq.clone())];
                if opt.index_reverse {
                    strands.push((Handle::reverse(node.id), dna::revcomp(&node.seq)));
                }
                for (h, seq) in strands {
                    for pos in minimizer_positions(&seq, opt.k, opt.w) {
                        hits.push((h, pos, seq[pos..pos + opt.k].to_vec()));
                    }
                }
                hits
            })
            .collect();

        let mut index: HashMap<Vec<u8>, Vec<(Handle, usize)>> = HashMap::new();
        let mut n_occ = 0usize;
        for (h, pos, kmer) in per_node.into_iter().flatten() {
            index.entry(kmer).or_default().push((h, pos));
            n_occ += 1;
        }
        debug!(
            "minimizer index: {} nodes, {} distinct k-mers, {} occurrences (k={}, w={})",
            nodes.len(),
            index.len(),
            n_occ,
            opt.k,
            opt.w
        );

        Ok(Self { graph, opt, index, version: graph.version() })
    }

    pub fn opt(&self) -> SeedOpt {
        self.opt
    }

    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    /// 不同 k-mer 的个数
    pub fn index_len(&self) -> usize {
        self.index.len()
    }

    /// 索引是否仍对应给定的图
    pub fn is_current(&self, graph: &Graph) -> bool {
        std::ptr::eq(self.graph, graph) && self.version == graph.version()
    }

    /// 查找 query 中所有 minimizer k-mer 在图中的精确出现
    pub fn seed(&self, query: &[u8]) -> Result<Vec<Seed>> {
        let k = self.opt.k;
        if k > query.len() {
            return Err(PgError::param(format!(
                "k={} exceeds query length {}",
                k,
                query.len()
            )));
        }
        let q = dna::normalize_seq(query);

        let mut seeds = Vec::new();
        for qpos in minimizer_positions(&q, k, self.opt.w) {
            if let Some(hits) = self.index.get(&q[qpos..qpos + k]) {
                seeds.extend(hits.iter().map(|&(handle, npos)| Seed { qpos, handle, npos }));
            }
        }
        seeds.sort_unstable();
        seeds.dedup();
        debug!("seeding: query {}bp -> {} seeds", q.len(), seeds.len());
        Ok(seeds)
    }
}
