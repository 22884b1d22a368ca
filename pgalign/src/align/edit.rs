use std::fmt;

use super::sw::ops_to_cigar;
use crate::error::{PgError, Result};
use crate::graph::{Graph, Handle, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditOp {
    Match,
    Mismatch,
    Insertion,
    Deletion,
}

impl EditOp {
    /// 单字符编码：M / X / I / D
    pub fn code(self) -> char {
        match self {
            EditOp::Match => 'M',
            EditOp::Mismatch => 'X',
            EditOp::Insertion => 'I',
            EditOp::Deletion => 'D',
        }
    }

    pub fn consumes_query(self) -> bool {
        !matches!(self, EditOp::Deletion)
    }

    pub fn consumes_graph(self) -> bool {
        !matches!(self, EditOp::Insertion)
    }
}

/// 图上一个碱基的位置：节点端 + 该方向上的偏移
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GraphPos {
    pub handle: Handle,
    pub offset: usize,
}

impl GraphPos {
    pub fn new(handle: Handle, offset: usize) -> Self {
        Self { handle, offset }
    }
}

impl fmt::Display for GraphPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.handle, self.offset)
    }
}

/// 单个比对操作。
///
/// Match / Mismatch / Insertion 带 query 偏移；Match / Mismatch / Deletion 带图位置。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edit {
    pub op: EditOp,
    pub qpos: Option<usize>,
    pub pos: Option<GraphPos>,
}

impl Edit {
    pub fn matched(qpos: usize, pos: GraphPos) -> Self {
        Self { op: EditOp::Match, qpos: Some(qpos), pos: Some(pos) }
    }

    pub fn mismatch(qpos: usize, pos: GraphPos) -> Self {
        Self { op: EditOp::Mismatch, qpos: Some(qpos), pos: Some(pos) }
    }

    pub fn insertion(qpos: usize) -> Self {
        Self { op: EditOp::Insertion, qpos: Some(qpos), pos: None }
    }

    pub fn deletion(pos: GraphPos) -> Self {
        Self { op: EditOp::Deletion, qpos: None, pos: Some(pos) }
    }

    pub fn node(&self) -> Option<NodeId> {
        self.pos.map(|p| p.handle.node)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditStats {
    pub matches: usize,
    pub mismatches: usize,
    pub insertions: usize,
    pub deletions: usize,
}

impl EditStats {
    pub fn of(edits: &[Edit]) -> Self {
        let mut s = Self::default();
        for e in edits {
            match e.op {
                EditOp::Match => s.matches += 1,
                EditOp::Mismatch => s.mismatches += 1,
                EditOp::Insertion => s.insertions += 1,
                EditOp::Deletion => s.deletions += 1,
            }
        }
        s
    }

    /// 编辑距离（NM）
    pub fn nm(&self) -> usize {
        self.mismatches + self.insertions + self.deletions
    }
}

/// 扩展 CIGAR（=/X/I/D）
pub fn edits_to_cigar(edits: &[Edit]) -> String {
    let ops: Vec<char> = edits
        .iter()
        .map(|e| match e.op {
            EditOp::Match => '=',
            op => op.code(),
        })
        .collect();
    ops_to_cigar(&ops)
}

/// 比对经过的节点端序列，相邻重复只保留一次
pub fn edit_path(edits: &[Edit]) -> Vec<Handle> {
    let mut path: Vec<Handle> = Vec::new();
    for h in edits.iter().filter_map(|e| e.pos.map(|p| p.handle)) {
        if path.last() != Some(&h) {
            path.push(h);
        }
    }
    path
}

/// 检查编辑脚本的形状：每个 query 碱基恰好一个消耗 query 的操作，且按顺序出现；
/// 每个操作按类型携带所需的偏移或位置。
pub fn check_script(edits: &[Edit], query_len: usize) -> Result<()> {
    let mut next_q = 0usize;
    for (i, e) in edits.iter().enumerate() {
        if e.op.consumes_query() {
            match e.qpos {
                Some(q) if q == next_q => next_q += 1,
                other => {
                    return Err(PgError::inconsistent(format!(
                        "edit {} ({}) has query offset {:?}, expected {}",
                        i,
                        e.op.code(),
                        other,
                        next_q
                    )))
                }
            }
        } else if e.qpos.is_some() {
            return Err(PgError::inconsistent(format!("deletion edit {} carries a query offset", i)));
        }
        if e.op.consumes_graph() != e.pos.is_some() {
            return Err(PgError::inconsistent(format!(
                "edit {} ({}) has a mismatched graph position",
                i,
                e.op.code()
            )));
        }
    }
    if next_q != query_len {
        return Err(PgError::inconsistent(format!(
            "edit script covers {} of {} query bases",
            next_q, query_len
        )));
    }
    Ok(())
}

/// 按顺序拼接消耗 query 的操作所对应的碱基，应当还原出 query
pub fn reconstruct_query(query: &[u8], edits: &[Edit]) -> Result<Vec<u8>> {
    edits
        .iter()
        .filter(|e| e.op.consumes_query())
        .map(|e| {
            e.qpos
                .and_then(|i| query.get(i))
                .map(u8::to_ascii_uppercase)
                .ok_or_else(|| PgError::inconsistent("query edit outside the query"))
        })
        .collect()
}

/// 带间隙的 query / 参考字符串，便于人工查看
pub fn alignment_strings(graph: &Graph, query: &[u8], edits: &[Edit]) -> Result<(String, String)> {
    let mut q = String::with_capacity(edits.len());
    let mut r = String::with_capacity(edits.len());
    let ref_base = |pos: Option<GraphPos>| -> Result<char> {
        let pos = pos.ok_or_else(|| PgError::inconsistent("graph edit without position"))?;
        graph
            .base(pos.handle, pos.offset)
            .map(char::from)
            .ok_or_else(|| PgError::reference(format!("edit position {} is outside the graph", pos)))
    };
    let query_base = |qpos: Option<usize>| -> Result<char> {
        qpos.and_then(|i| query.get(i))
            .map(|&b| char::from(b.to_ascii_uppercase()))
            .ok_or_else(|| PgError::inconsistent("query edit outside the query"))
    };
    for e in edits {
        match e.op {
            EditOp::Match | EditOp::Mismatch => {
                q.push(query_base(e.qpos)?);
                r.push(ref_base(e.pos)?);
            }
            EditOp::Insertion => {
                q.push(query_base(e.qpos)?);
                r.push('-');
            }
            EditOp::Deletion => {
                q.push('-');
                r.push(ref_base(e.pos)?);
            }
        }
    }
    Ok((q, r))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(node: NodeId, offset: usize) -> GraphPos {
        GraphPos::new(Handle::forward(node), offset)
    }

    fn sample() -> Vec<Edit> {
        vec![
            Edit::matched(0, pos(1, 0)),
            Edit::matched(1, pos(1, 1)),
            Edit::mismatch(2, pos(2, 0)),
            Edit::insertion(3),
            Edit::deletion(pos(2, 1)),
            Edit::matched(4, pos(3, 0)),
        ]
    }

    #[test]
    fn cigar_and_stats() {
        let edits = sample();
        assert_eq!(edits_to_cigar(&edits), "2=1X1I1D1=");
        let s = EditStats::of(&edits);
        assert_eq!((s.matches, s.mismatches, s.insertions, s.deletions), (3, 1, 1, 1));
        assert_eq!(s.nm(), 3);
    }

    #[test]
    fn path_is_deduplicated() {
        let path = edit_path(&sample());
        assert_eq!(path, vec![Handle::forward(1), Handle::forward(2), Handle::forward(3)]);
    }

    #[test]
    fn script_shape_is_checked() {
        let edits = sample();
        check_script(&edits, 5).unwrap();
        assert!(check_script(&edits, 6).is_err());
        let mut skipped = edits.clone();
        skipped.remove(1);
        assert!(matches!(check_script(&skipped, 5), Err(PgError::InconsistentGraph(_))));
    }

    #[test]
    fn query_is_reconstructed() {
        assert_eq!(reconstruct_query(b"acgca", &sample()).unwrap(), b"ACGCA".to_vec());
        assert!(reconstruct_query(b"ACG", &sample()).is_err());
    }

    #[test]
    fn strings_show_gaps() {
        let mut g = Graph::new();
        g.add_node(b"AC").unwrap();
        g.add_node(b"TG").unwrap();
        g.add_node(b"A").unwrap();
        let (q, r) = alignment_strings(&g, b"ACGCA", &sample()).unwrap();
        assert_eq!(q, "ACGC-A");
        assert_eq!(r, "ACT-GA");
    }
}
