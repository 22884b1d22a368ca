use std::fmt::Write as _;

const NEG_INF: i32 = i32::MIN / 4;

/// 仿射间隙打分参数（得分最大化，等价于代价最小化）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScoreParams {
    pub match_score: i32,
    pub mismatch_penalty: i32,
    pub gap_open: i32,
    pub gap_extend: i32,
}

impl Default for ScoreParams {
    fn default() -> Self {
        Self { match_score: 2, mismatch_penalty: 4, gap_open: 4, gap_extend: 2 }
    }
}

/// DP 结果。ops 中 'M' 为对齐列（匹配或错配），'I' 只消耗 query，'D' 只消耗参考。
#[derive(Debug, PartialEq, Eq)]
pub struct DpResult {
    pub score: i32,
    /// 参考上被使用的前缀长度
    pub ref_end: usize,
    pub ops: Vec<char>,
}

/// DP 工作缓冲区，可跨调用复用。
///
/// 只存带内单元：第 i 行保留 j ∈ [i-band, i+band]，共 2·band+1 列，
/// 内存随 query 长度线性增长。
#[derive(Default)]
pub struct DpBuffer {
    h: Vec<i32>,
    e: Vec<i32>,
    f: Vec<i32>,
    band: usize,
}

impl DpBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 上次填充使用的单元数
    pub fn cells(&self) -> usize {
        self.h.len()
    }

    fn resize(&mut self, rows: usize, band: usize) {
        let size = rows * (2 * band + 1);
        self.band = band;
        self.h.clear();
        self.e.clear();
        self.f.clear();
        self.h.resize(size, NEG_INF);
        self.e.resize(size, NEG_INF);
        self.f.resize(size, NEG_INF);
    }

    /// (i, j) 在带内时的存储下标
    #[inline]
    fn at(&self, i: usize, j: usize) -> Option<usize> {
        if j + self.band < i || j > i + self.band {
            None
        } else {
            Some(i * (2 * self.band + 1) + j + self.band - i)
        }
    }

    #[inline]
    fn h_at(&self, i: usize, j: usize) -> i32 {
        self.at(i, j).map_or(NEG_INF, |x| self.h[x])
    }
}

/// 全局对齐：query 与 reference 均被完整消耗。
/// 长度差超过带宽时终点不可达，返回 None。
pub fn align_global(
    query: &[u8],
    reference: &[u8],
    p: ScoreParams,
    band: usize,
    buf: &mut DpBuffer,
) -> Option<DpResult> {
    fill(query, reference, p, band, buf);
    let (m, n) = (query.len(), reference.len());
    let score = buf.h[buf.at(m, n)?];
    let ops = traceback(query, reference, p, buf, m, n);
    Some(DpResult { score, ref_end: n, ops })
}

/// 半全局对齐：query 完整消耗，reference 从头开始、末端自由。
/// 同分时取使用参考最短的终点。
///
/// reference 在带内就已耗尽时（图上的末端），query 余下部分以末尾插入收尾。
pub fn align_free_end(query: &[u8], reference: &[u8], p: ScoreParams, band: usize, buf: &mut DpBuffer) -> DpResult {
    fill(query, reference, p, band, buf);
    let (m, n) = (query.len(), reference.len());
    let b = buf.band;

    let mut best: Option<(i32, usize, usize)> = None;
    for j in m.saturating_sub(b)..=n.min(m + b) {
        let s = buf.h_at(m, j);
        if best.map_or(true, |(bs, _, _)| s > bs) {
            best = Some((s, m, j));
        }
    }
    for i in (n.saturating_sub(b)..m).rev() {
        if buf.at(i, n).is_none() {
            continue;
        }
        let s = buf.h_at(i, n) - p.gap_open - p.gap_extend * (m - i) as i32;
        if best.map_or(true, |(bs, _, _)| s > bs) {
            best = Some((s, i, n));
        }
    }

    let Some((score, end_i, end_j)) = best else {
        return DpResult { score: -(p.gap_open + p.gap_extend * m as i32), ref_end: 0, ops: vec!['I'; m] };
    };
    let mut ops = traceback(query, reference, p, buf, end_i, end_j);
    ops.resize(ops.len() + (m - end_i), 'I');
    DpResult { score, ref_end: end_j, ops }
}

#[inline]
fn subst(q: u8, r: u8, p: ScoreParams) -> i32 {
    if q == r {
        p.match_score
    } else {
        -p.mismatch_penalty
    }
}

fn fill(query: &[u8], reference: &[u8], p: ScoreParams, band: usize, buf: &mut DpBuffer) {
    let m = query.len();
    let n = reference.len();
    buf.resize(m + 1, band.min(m.max(n)));
    let b = buf.band;

    for i in 0..=m {
        for j in i.saturating_sub(b)..=n.min(i + b) {
            let Some(idx) = buf.at(i, j) else { continue };
            if i == 0 && j == 0 {
                buf.h[idx] = 0;
                continue;
            }
            if i == 0 {
                let v = -(p.gap_open + p.gap_extend * j as i32);
                buf.f[idx] = v;
                buf.h[idx] = v;
                continue;
            }
            if j == 0 {
                let v = -(p.gap_open + p.gap_extend * i as i32);
                buf.e[idx] = v;
                buf.h[idx] = v;
                continue;
            }

            let (h_up, e_up) = buf.at(i - 1, j).map_or((NEG_INF, NEG_INF), |u| (buf.h[u], buf.e[u]));
            let (h_left, f_left) = buf.at(i, j - 1).map_or((NEG_INF, NEG_INF), |l| (buf.h[l], buf.f[l]));

            let e = (h_up - p.gap_open - p.gap_extend).max(e_up - p.gap_extend);
            let f = (h_left - p.gap_open - p.gap_extend).max(f_left - p.gap_extend);
            let diag = buf.h_at(i - 1, j - 1) + subst(query[i - 1], reference[j - 1], p);

            buf.e[idx] = e;
            buf.f[idx] = f;
            buf.h[idx] = diag.max(e).max(f);
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    H,
    E,
    F,
}

/// 从 (end_i, end_j) 回溯；同分时依次优先对角、插入、缺失
fn traceback(
    query: &[u8],
    reference: &[u8],
    p: ScoreParams,
    buf: &DpBuffer,
    end_i: usize,
    end_j: usize,
) -> Vec<char> {
    let mut ops: Vec<char> = Vec::with_capacity(end_i + end_j);
    let mut i = end_i;
    let mut j = end_j;
    let mut state = State::H;

    while i > 0 || j > 0 {
        let Some(idx) = buf.at(i, j) else { break };
        match state {
            State::H => {
                if i > 0 && j > 0 {
                    let diag = buf.h_at(i - 1, j - 1) + subst(query[i - 1], reference[j - 1], p);
                    if buf.h[idx] == diag {
                        ops.push('M');
                        i -= 1;
                        j -= 1;
                        continue;
                    }
                }
                state = if i > 0 && buf.h[idx] == buf.e[idx] {
                    State::E
                } else if j > 0 && buf.h[idx] == buf.f[idx] {
                    State::F
                } else if j == 0 {
                    State::E
                } else {
                    State::F
                };
            }
            State::E => {
                ops.push('I');
                let opened = i == 1 || buf.e[idx] == buf.h_at(i - 1, j) - p.gap_open - p.gap_extend;
                i -= 1;
                if opened {
                    state = State::H;
                }
            }
            State::F => {
                ops.push('D');
                let opened = j == 1 || buf.f[idx] == buf.h_at(i, j - 1) - p.gap_open - p.gap_extend;
                j -= 1;
                if opened {
                    state = State::H;
                }
            }
        }
    }

    ops.reverse();
    ops
}

/// 把逐列操作压缩为 CIGAR 字符串
pub fn ops_to_cigar(ops: &[char]) -> String {
    let mut cigar = String::new();
    if ops.is_empty() {
        return cigar;
    }
    let mut cur = ops[0];
    let mut len = 1usize;
    for &op in &ops[1..] {
        if op == cur {
            len += 1;
        } else {
            let _ = write!(&mut cigar, "{}{}", len, cur);
            cur = op;
            len = 1;
        }
    }
    let _ = write!(&mut cigar, "{}{}", len, cur);
    cigar
}

#[cfg(test)]
mod tests {
    use super::*;

    const BAND: usize = 16;

    fn params() -> ScoreParams {
        ScoreParams::default()
    }

    fn count(ops: &[char], c: char) -> usize {
        ops.iter().filter(|&&o| o == c).count()
    }

    #[test]
    fn global_perfect_match() {
        let mut buf = DpBuffer::new();
        let res = align_global(b"ACGT", b"ACGT", params(), BAND, &mut buf).unwrap();
        assert_eq!(res.score, 8);
        assert_eq!(ops_to_cigar(&res.ops), "4M");
    }

    #[test]
    fn global_single_mismatch() {
        let mut buf = DpBuffer::new();
        let res = align_global(b"AGGT", b"ACGT", params(), BAND, &mut buf).unwrap();
        assert_eq!(ops_to_cigar(&res.ops), "4M");
        assert_eq!(res.score, 3 * 2 - 4);
    }

    #[test]
    fn global_insertion_and_deletion() {
        let mut buf = DpBuffer::new();
        let ins = align_global(b"ACGGTT", b"ACGTT", params(), BAND, &mut buf).unwrap();
        assert_eq!(count(&ins.ops, 'I'), 1);
        assert_eq!(count(&ins.ops, 'M'), 5);
        assert_eq!(ins.score, 5 * 2 - 4 - 2);

        let del = align_global(b"ACTT", b"ACGTT", params(), BAND, &mut buf).unwrap();
        assert_eq!(count(&del.ops, 'D'), 1);
        assert_eq!(count(&del.ops, 'M'), 4);
    }

    #[test]
    fn global_affine_gap_stays_contiguous() {
        let mut buf = DpBuffer::new();
        let res = align_global(b"AAAACCCCGGGG", b"AAAAGGGG", params(), BAND, &mut buf).unwrap();
        assert_eq!(ops_to_cigar(&res.ops), "4M4I4M");
        assert_eq!(res.score, 16 - 4 - 4 * 2);
    }

    #[test]
    fn global_empty_sides() {
        let mut buf = DpBuffer::new();
        let only_ref = align_global(b"", b"ACG", params(), BAND, &mut buf).unwrap();
        assert_eq!(only_ref.ops, vec!['D', 'D', 'D']);
        let only_query = align_global(b"AC", b"", params(), BAND, &mut buf).unwrap();
        assert_eq!(only_query.ops, vec!['I', 'I']);
        let none = align_global(b"", b"", params(), BAND, &mut buf).unwrap();
        assert!(none.ops.is_empty());
        assert_eq!(none.score, 0);
    }

    #[test]
    fn free_end_uses_shortest_best_prefix() {
        let mut buf = DpBuffer::new();
        let res = align_free_end(b"ACG", b"ACGTTTT", params(), BAND, &mut buf);
        assert_eq!(res.ref_end, 3);
        assert_eq!(res.ops, vec!['M', 'M', 'M']);
        assert_eq!(res.score, 6);

        let empty = align_free_end(b"", b"ACGT", params(), BAND, &mut buf);
        assert_eq!(empty.ref_end, 0);
        assert!(empty.ops.is_empty());
    }

    #[test]
    fn buffer_reuse_across_shapes() {
        let mut buf = DpBuffer::new();
        let r1 = align_global(b"ACGTACGT", b"ACGTACGT", params(), BAND, &mut buf).unwrap();
        assert_eq!(r1.score, 16);
        let r2 = align_global(b"AC", b"AC", params(), BAND, &mut buf).unwrap();
        assert_eq!(r2.score, 4);
    }

    #[test]
    fn global_outside_band_is_unreachable() {
        let mut buf = DpBuffer::new();
        assert!(align_global(b"ACGTACGTAC", b"AC", params(), 3, &mut buf).is_none());
        let wide = align_global(b"ACGTACGTAC", b"AC", params(), 8, &mut buf).unwrap();
        assert_eq!(count(&wide.ops, 'I'), 8);
        assert_eq!(count(&wide.ops, 'M'), 2);
    }

    #[test]
    fn band_bounds_buffer_size() {
        let mut x: u32 = 7;
        let reference: Vec<u8> = (0..4_050)
            .map(|_| {
                x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                b"ACGT"[(x >> 16) as usize % 4]
            })
            .collect();
        let query = &reference[..4_000];
        let mut buf = DpBuffer::new();
        let res = align_free_end(query, &reference, params(), 20, &mut buf);
        assert_eq!(buf.cells(), 4_001 * 41);
        assert_eq!(res.ref_end, 4_000);
        assert_eq!(res.score, 8_000);
        assert_eq!(count(&res.ops, 'M'), 4_000);
    }

    #[test]
    fn free_end_overhang_becomes_insertions() {
        let query = [b"ACGT".as_slice(), &[b'A'; 56]].concat();
        let mut buf = DpBuffer::new();
        let res = align_free_end(&query, b"ACGT", params(), 5, &mut buf);
        assert_eq!(ops_to_cigar(&res.ops), "4M56I");
        assert_eq!(res.ref_end, 4);
        assert_eq!(res.score, 8 - 4 - 56 * 2);
    }

    #[test]
    fn cigar_run_length() {
        assert_eq!(ops_to_cigar(&['=', '=', 'X', 'I', 'I']), "2=1X2I");
        assert_eq!(ops_to_cigar(&[]), "");
    }
}
