//! 把一条比对作为新路径加入图。
//!
//! 与图一致的匹配段沿用（必要时拆分）已有节点，错配 / 插入段生成新节点，
//! 纯缺失段只补一条跳过边，从而在图中形成 bubble。

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info};

use crate::align::edit::{check_script, Edit, EditOp, GraphPos};
use crate::error::{PgError, Result};
use crate::graph::{Graph, Handle, NodeId};
use crate::util::dna;

/// 连续同类编辑：Shared 为匹配段，Novel 为错配 / 插入 / 缺失段
#[derive(Debug)]
enum Run<'e> {
    Shared(&'e [Edit]),
    Novel(&'e [Edit]),
}

/// 在 `graph` 的副本上加入名为 `name` 的路径并返回新图；失败时原图不受影响。
///
/// 已有路径经过被拆分的节点时会改走两半，拼出的序列不变。
///
/// query 只接受 ACGTN（不分大小写，U 视为 T）；IUPAC 兼并碱基等其他字符返回
/// `InvalidParameter`，不会被改写成 N 写进图里。
pub fn add_alignment(graph: &Graph, query: &[u8], edits: &[Edit], name: &str) -> Result<Graph> {
    if name.is_empty() {
        return Err(PgError::param("path name must not be empty"));
    }
    if graph.path(name).is_some() {
        return Err(PgError::param(format!("path '{}' already exists", name)));
    }
    if let Some(at) = query.iter().position(|&b| !dna::is_nucleotide(b)) {
        return Err(PgError::param(format!(
            "query byte '{}' at offset {} is not A, C, G, T or N",
            query[at].escape_ascii(),
            at
        )));
    }
    let query = dna::normalize_seq(query);
    check_script(edits, query.len())?;
    check_positions(graph, &query, edits)?;

    let runs = segment(edits);
    let cuts = collect_cuts(graph, &runs)?;

    let mut out = graph.clone();
    let mut pieces: BTreeMap<NodeId, Vec<(usize, NodeId)>> = BTreeMap::new();
    let mut n_splits = 0usize;
    for (&id, offsets) in &cuts {
        let mut current = id;
        let mut parts = Vec::with_capacity(offsets.len() + 1);
        for &offset in offsets.iter().rev() {
            let (left, right) = out.split_node(current, offset)?;
            parts.push((offset, right));
            current = left;
            n_splits += 1;
        }
        parts.push((0, current));
        parts.reverse();
        pieces.insert(id, parts);
    }

    let mut steps: Vec<Handle> = Vec::new();
    let mut n_novel = 0usize;
    for run in &runs {
        match run {
            Run::Shared(run) => {
                for e in run.iter() {
                    let pos = e.pos.ok_or_else(|| PgError::inconsistent("match edit without position"))?;
                    let (h, offset) = locate(graph, &pieces, pos)?;
                    if offset == 0 {
                        steps.push(h);
                    }
                }
            }
            Run::Novel(run) => {
                let bases: Vec<u8> = run
                    .iter()
                    .filter(|e| e.op.consumes_query())
                    .filter_map(|e| e.qpos.and_then(|i| query.get(i).copied()))
                    .collect();
                if !bases.is_empty() {
                    let id = out.add_node(&bases)?;
                    steps.push(Handle::forward(id));
                    n_novel += 1;
                }
            }
        }
    }

    let mut n_edges = 0usize;
    for pair in steps.windows(2) {
        if !out.has_edge(pair[0], pair[1]) {
            out.add_edge(pair[0], pair[1])?;
            n_edges += 1;
        }
    }
    out.add_path(name, &steps)?;

    let spelled = out.path_sequence(name)?;
    if spelled != query {
        return Err(PgError::inconsistent(format!(
            "path '{}' spells {} bases that differ from the query",
            name,
            spelled.len()
        )));
    }
    out.validate()?;

    debug!("path '{}': {:?}", name, steps);
    info!(
        "added path '{}' ({} steps): {} splits, {} novel nodes, {} new edges",
        name,
        steps.len(),
        n_splits,
        n_novel,
        n_edges
    );
    Ok(out)
}

/// 图位置存在、匹配碱基一致、相邻图位置首尾相接
fn check_positions(graph: &Graph, query: &[u8], edits: &[Edit]) -> Result<()> {
    let mut prev: Option<GraphPos> = None;
    for e in edits {
        let Some(pos) = e.pos else { continue };
        let base = graph
            .base(pos.handle, pos.offset)
            .ok_or_else(|| PgError::reference(format!("edit position {} is outside the graph", pos)))?;
        if e.op == EditOp::Match {
            let q = e.qpos.and_then(|i| query.get(i).copied());
            if q != Some(base) {
                return Err(PgError::inconsistent(format!(
                    "match at {} disagrees with the graph base {}",
                    pos,
                    char::from(base)
                )));
            }
        }
        if let Some(p) = prev {
            let same_node = p.handle == pos.handle && pos.offset == p.offset + 1;
            let crossing = pos.offset == 0
                && graph.node_len(p.handle.node) == Some(p.offset + 1)
                && graph.has_edge(p.handle, pos.handle);
            if !same_node && !crossing {
                return Err(PgError::inconsistent(format!("edit positions {} -> {} are not adjacent", p, pos)));
            }
        }
        prev = Some(pos);
    }
    Ok(())
}

fn segment(edits: &[Edit]) -> Vec<Run<'_>> {
    let mut runs = Vec::new();
    let mut start = 0usize;
    for i in 1..=edits.len() {
        let boundary = i == edits.len() || (edits[i].op == EditOp::Match) != (edits[start].op == EditOp::Match);
        if boundary {
            let slice = &edits[start..i];
            runs.push(if edits[start].op == EditOp::Match { Run::Shared(slice) } else { Run::Novel(slice) });
            start = i;
        }
    }
    runs
}

/// 每个匹配段两端的断点，换算为正向偏移；节点两端不用拆
fn collect_cuts(graph: &Graph, runs: &[Run<'_>]) -> Result<BTreeMap<NodeId, BTreeSet<usize>>> {
    let mut cuts: BTreeMap<NodeId, BTreeSet<usize>> = BTreeMap::new();
    for run in runs {
        let Run::Shared(run) = run else { continue };
        let (Some(first), Some(last)) = (run.first().and_then(|e| e.pos), run.last().and_then(|e| e.pos)) else {
            continue;
        };
        for (pos, before) in [(first, true), (last, false)] {
            let len = graph
                .node_len(pos.handle.node)
                .ok_or_else(|| PgError::reference(format!("unknown node {}", pos.handle.node)))?;
            let cut = match (pos.handle.is_reverse(), before) {
                (false, true) => pos.offset,
                (false, false) => pos.offset + 1,
                (true, true) => len - pos.offset,
                (true, false) => len - pos.offset - 1,
            };
            if cut > 0 && cut < len {
                cuts.entry(pos.handle.node).or_default().insert(cut);
            }
        }
    }
    Ok(cuts)
}

/// 原图位置在拆分后落在哪一块、块内偏移多少
fn locate(graph: &Graph, pieces: &BTreeMap<NodeId, Vec<(usize, NodeId)>>, pos: GraphPos) -> Result<(Handle, usize)> {
    let node = pos.handle.node;
    let len = graph
        .node_len(node)
        .ok_or_else(|| PgError::reference(format!("unknown node {}", node)))?;
    let fwd = if pos.handle.is_reverse() { len - 1 - pos.offset } else { pos.offset };
    let (start, end, id) = match pieces.get(&node) {
        None => (0, len, node),
        Some(parts) => {
            let i = parts.partition_point(|&(s, _)| s <= fwd).saturating_sub(1);
            let end = parts.get(i + 1).map_or(len, |&(s, _)| s);
            (parts[i].0, end, parts[i].1)
        }
    };
    let inner = fwd - start;
    if pos.handle.is_reverse() {
        Ok((Handle::reverse(id), end - start - 1 - inner))
    } else {
        Ok((Handle::forward(id), inner))
    }
}
