//! 比对流程：种子 → 链 → 逐碱基扩展。

pub mod chain;
pub mod edit;
pub mod extend;
pub mod seed;
pub mod sw;

pub use chain::{objective_from_tag, Chain, ChainOpt, ChainScore, Chainer, MaxScore};
pub use edit::{
    alignment_strings, check_script, edit_path, edits_to_cigar, reconstruct_query, Edit, EditOp, EditStats, GraphPos,
};
pub use extend::{Aligner, ExtendOpt};
pub use seed::{minimizer_positions, Seed, SeedOpt, Seeder};
pub use sw::{align_free_end, align_global, ops_to_cigar, DpBuffer, DpResult, ScoreParams};

use log::debug;

use crate::error::{PgError, Result};
use crate::graph::{DistanceTable, Graph};

/// 一次比对的全部参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignOpt {
    pub k: usize,
    pub w: usize,
    /// 链上每个种子的得分
    pub reward: i64,
    /// 链打分目标名称
    pub objective: String,
    pub index_reverse: bool,
    /// 链上图距与 query 距之差的上限，同时是延伸 DP 的带宽
    pub max_gap_diff: usize,
    pub max_walks: usize,
    pub score: ScoreParams,
}

impl Default for AlignOpt {
    fn default() -> Self {
        Self {
            k: 3,
            w: 5,
            reward: 10,
            objective: "max".to_string(),
            index_reverse: false,
            max_gap_diff: 50,
            max_walks: 256,
            score: ScoreParams::default(),
        }
    }
}

impl AlignOpt {
    pub fn validate(&self) -> Result<()> {
        self.seed_opt().validate()?;
        if self.reward <= 0 {
            return Err(PgError::param(format!("reward must be > 0, got {}", self.reward)));
        }
        if self.max_walks == 0 {
            return Err(PgError::param("max_walks must be >= 1"));
        }
        let s = self.score;
        if s.match_score <= 0 || s.mismatch_penalty < 0 || s.gap_open < 0 || s.gap_extend <= 0 {
            return Err(PgError::param(format!("invalid scoring parameters {:?}", s)));
        }
        Ok(())
    }

    pub fn seed_opt(&self) -> SeedOpt {
        SeedOpt { k: self.k, w: self.w, index_reverse: self.index_reverse }
    }

    pub fn chain_opt(&self) -> ChainOpt {
        ChainOpt { k: self.k, max_gap_diff: self.max_gap_diff }
    }

    pub fn extend_opt(&self) -> ExtendOpt {
        ExtendOpt { k: self.k, max_gap_diff: self.max_gap_diff, max_walks: self.max_walks }
    }
}

/// 单条 query 的比对结果，保留各阶段的中间产物
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentResult {
    pub seeds: Vec<Seed>,
    pub chain: Vec<Seed>,
    pub edits: Vec<Edit>,
}

impl AlignmentResult {
    pub fn stats(&self) -> EditStats {
        EditStats::of(&self.edits)
    }

    pub fn cigar(&self) -> String {
        edits_to_cigar(&self.edits)
    }
}

/// 用已建好的索引比对一条 query
pub fn align_with_seeder(
    seeder: &Seeder<'_>,
    query: &[u8],
    opt: &AlignOpt,
    dists: Option<&DistanceTable>,
) -> Result<AlignmentResult> {
    opt.validate()?;
    let graph = seeder.graph();
    let seeds = seeder.seed(query)?;
    let chainer = Chainer::from_tag(graph, &opt.objective, opt.reward, dists, opt.chain_opt())?;
    let chain = chainer.filter(&seeds)?;
    let aligner = Aligner::new(graph, opt.score, opt.extend_opt())?;
    let edits = aligner.align(query, &chain)?;
    debug!(
        "aligned {}bp: {} seeds, chain {}, cigar {}",
        query.len(),
        seeds.len(),
        chain.len(),
        edits_to_cigar(&edits)
    );
    Ok(AlignmentResult { seeds, chain, edits })
}

/// 建索引并比对一条 query
pub fn align_query(
    graph: &Graph,
    query: &[u8],
    opt: &AlignOpt,
    dists: Option<&DistanceTable>,
) -> Result<AlignmentResult> {
    opt.validate()?;
    let seeder = Seeder::new(graph, opt.seed_opt())?;
    align_with_seeder(&seeder, query, opt, dists)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_interactive_driver() {
        let opt = AlignOpt::default();
        assert_eq!((opt.k, opt.w, opt.reward), (3, 5, 10));
        opt.validate().unwrap();
    }

    #[test]
    fn invalid_options_are_rejected() {
        let g = Graph::from_sequence("ref", b"ACGTACGT").unwrap();
        for opt in [
            AlignOpt { k: 0, ..AlignOpt::default() },
            AlignOpt { w: 0, ..AlignOpt::default() },
            AlignOpt { reward: 0, ..AlignOpt::default() },
            AlignOpt { objective: "min".to_string(), ..AlignOpt::default() },
        ] {
            let err = align_query(&g, b"ACGTACGT", &opt, None).unwrap_err();
            assert!(matches!(err, PgError::InvalidParameter(_)), "{:?}", opt);
        }
    }

    #[test]
    fn query_shorter_than_k_is_rejected() {
        let g = Graph::from_sequence("ref", b"ACGTACGT").unwrap();
        let opt = AlignOpt { k: 5, ..AlignOpt::default() };
        assert!(matches!(align_query(&g, b"ACG", &opt, None), Err(PgError::InvalidParameter(_))));
    }

    #[test]
    fn pipeline_reports_stages() {
        let g = Graph::from_sequence("ref", b"ACGTACGT").unwrap();
        let opt = AlignOpt { k: 3, w: 2, ..AlignOpt::default() };
        let res = align_query(&g, b"ACGTACGT", &opt, None).unwrap();
        assert_eq!(res.seeds.len(), 6);
        assert_eq!(res.chain.len(), 4);
        assert_eq!(res.cigar(), "8=");
        assert_eq!(res.stats().nm(), 0);
    }
}
