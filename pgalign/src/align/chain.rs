use std::collections::HashMap;

use log::debug;

use super::seed::Seed;
use crate::error::{PgError, Result};
use crate::graph::{shortest_gaps, DistanceTable, Graph, Handle, NodeId};

/// 链打分目标：单个种子的得分与一次转移的间隙罚分
pub trait ChainScore: Send + Sync {
    fn seed_score(&self) -> i64;

    /// query 间隔与图上间隔不一致时的罚分，随二者差值单调不减
    fn gap_penalty(&self, query_gap: usize, graph_gap: usize) -> i64;
}

/// "max" 目标：最大化 Σreward − gap_cost·|graph_gap − query_gap|
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxScore {
    pub reward: i64,
    pub gap_cost: i64,
}

impl MaxScore {
    pub fn new(reward: i64) -> Result<Self> {
        if reward <= 0 {
            return Err(PgError::param(format!("reward must be > 0, got {}", reward)));
        }
        Ok(Self { reward, gap_cost: 1 })
    }
}

impl ChainScore for MaxScore {
    fn seed_score(&self) -> i64 {
        self.reward
    }

    fn gap_penalty(&self, query_gap: usize, graph_gap: usize) -> i64 {
        self.gap_cost * query_gap.abs_diff(graph_gap) as i64
    }
}

/// 按名称选择打分目标；目前只有 "max"
pub fn objective_from_tag(tag: &str, reward: i64) -> Result<Box<dyn ChainScore>> {
    match tag {
        "max" => Ok(Box::new(MaxScore::new(reward)?)),
        other => Err(PgError::param(format!("unknown chaining objective '{}'", other))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainOpt {
    /// 种子长度（与 Seeder 的 k 一致）
    pub k: usize,
    /// 允许的 |graph_gap − query_gap| 上限
    pub max_gap_diff: usize,
}

impl Default for ChainOpt {
    fn default() -> Self {
        Self { k: 3, max_gap_diff: 50 }
    }
}

/// 种子链
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    pub seeds: Vec<Seed>,
    pub score: i64,
}

/// 节点端距离来源：外部距离表，或在图上按需搜索
enum Distances<'a> {
    Table(&'a DistanceTable),
    Search {
        graph: &'a Graph,
        limit: usize,
        cache: HashMap<Handle, HashMap<Handle, usize>>,
    },
}

impl Distances<'_> {
    fn between(&mut self, from: Handle, to: Handle) -> Option<usize> {
        match self {
            Distances::Table(t) => t.get(from, to),
            Distances::Search { graph, limit, cache } => {
                let (graph, limit) = (*graph, *limit);
                cache
                    .entry(from)
                    .or_insert_with(|| shortest_gaps(graph, from, limit))
                    .get(&to)
                    .copied()
            }
        }
    }
}

/// 共线链选择器。
///
/// 在按 query 偏移排序的种子上做 DP：每个种子记录以它结尾的最佳得分，
/// 前驱必须 query 偏移严格更小，且在图上以与 query 间隔相符的距离可达。
pub struct Chainer<'g> {
    graph: &'g Graph,
    score: Box<dyn ChainScore>,
    dists: Option<&'g DistanceTable>,
    opt: ChainOpt,
}

impl<'g> Chainer<'g> {
    /// `dists` 为 None 时在图上按需计算距离；给出距离表时缺失条目即禁止转移
    pub fn new(
        graph: &'g Graph,
        score: Box<dyn ChainScore>,
        dists: Option<&'g DistanceTable>,
        opt: ChainOpt,
    ) -> Result<Self> {
        if opt.k == 0 {
            return Err(PgError::param("k must be >= 1"));
        }
        if score.seed_score() <= 0 {
            return Err(PgError::param("seed score must be > 0"));
        }
        Ok(Self { graph, score, dists, opt })
    }

    pub fn from_tag(
        graph: &'g Graph,
        tag: &str,
        reward: i64,
        dists: Option<&'g DistanceTable>,
        opt: ChainOpt,
    ) -> Result<Self> {
        Self::new(graph, objective_from_tag(tag, reward)?, dists, opt)
    }

    /// 最佳链的种子序列；无种子时为空
    pub fn filter(&self, seeds: &[Seed]) -> Result<Vec<Seed>> {
        Ok(self.best_chain(seeds)?.map(|c| c.seeds).unwrap_or_default())
    }

    pub fn best_chain(&self, seeds: &[Seed]) -> Result<Option<Chain>> {
        if seeds.is_empty() {
            return Ok(None);
        }
        let mut order = seeds.to_vec();
        order.sort_unstable();
        order.dedup();
        for s in &order {
            let len = self.graph.node_len(s.node()).ok_or_else(|| {
                PgError::reference(format!("seed at query {} names unknown node {}", s.qpos, s.node()))
            })?;
            if s.npos + self.opt.k > len {
                return Err(PgError::reference(format!(
                    "seed at node {} offset {} runs past node end",
                    s.node(),
                    s.npos
                )));
            }
        }

        let span = order[order.len() - 1].qpos - order[0].qpos;
        let mut dists = match self.dists {
            Some(t) => Distances::Table(t),
            None => Distances::Search {
                graph: self.graph,
                limit: span + self.opt.max_gap_diff,
                cache: HashMap::new(),
            },
        };

        let n = order.len();
        let base = self.score.seed_score();
        let mut dp: Vec<i64> = vec![0; n];
        let mut prev: Vec<Option<usize>> = vec![None; n];

        for j in 0..n {
            let sj = order[j];
            dp[j] = base;
            // (graph gap, predecessor node) of the current best predecessor
            let mut best_key: Option<(usize, NodeId)> = None;

            for i in 0..j {
                let si = order[i];
                if si.qpos >= sj.qpos {
                    continue;
                }
                let query_gap = sj.qpos - si.qpos;
                let Some(graph_gap) = self.graph_gap(&si, &sj, &mut dists) else {
                    continue;
                };
                if !self.admissible(query_gap, graph_gap) {
                    continue;
                }
                let cand = dp[i] + base - self.score.gap_penalty(query_gap, graph_gap);
                let key = (graph_gap, si.node());
                let better = cand > dp[j]
                    || (cand == dp[j] && best_key.is_some_and(|bk| key < bk));
                if better {
                    dp[j] = cand;
                    prev[j] = Some(i);
                    best_key = Some(key);
                }
            }
        }

        let mut best_t = 0usize;
        for t in 1..n {
            if dp[t] > dp[best_t] || (dp[t] == dp[best_t] && order[t].node() < order[best_t].node()) {
                best_t = t;
            }
        }

        let mut chain_idxs = Vec::new();
        let mut cur = Some(best_t);
        while let Some(t) = cur {
            chain_idxs.push(t);
            cur = prev[t];
        }
        chain_idxs.reverse();

        let chain = Chain {
            seeds: chain_idxs.into_iter().map(|t| order[t]).collect(),
            score: dp[best_t],
        };
        debug!(
            "chaining: {} seeds -> chain of {} (score {})",
            n,
            chain.seeds.len(),
            chain.score
        );
        Ok(Some(chain))
    }

    /// 从种子 a 起点到种子 b 起点在图上经过的碱基数
    fn graph_gap(&self, a: &Seed, b: &Seed, dists: &mut Distances<'_>) -> Option<usize> {
        if a.handle == b.handle && b.npos >= a.npos {
            return Some(b.npos - a.npos);
        }
        let tail = self.graph.node_len(a.node())? - a.npos;
        let mid = dists.between(a.handle, b.handle)?;
        Some(tail + mid + b.npos)
    }

    /// query 上重叠的种子必须在同一对角线上；不重叠的种子在图上也不能重叠
    fn admissible(&self, query_gap: usize, graph_gap: usize) -> bool {
        let k = self.opt.k;
        if query_gap < k {
            graph_gap == query_gap
        } else {
            graph_gap >= k && query_gap.abs_diff(graph_gap) <= self.opt.max_gap_diff
        }
    }
}
