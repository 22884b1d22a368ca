use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PgError, Result};
use crate::graph::Graph;

const MAGIC: [u8; 4] = *b"PGA1";

/// 图快照的来源信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphMeta {
    pub source: Option<String>,
    pub build_args: Option<String>,
    /// RFC3339
    pub build_timestamp: Option<String>,
}

impl GraphMeta {
    /// 以当前命令行和时间填写
    pub fn now(source: &str) -> Self {
        Self {
            source: Some(source.to_string()),
            build_args: Some(std::env::args().collect::<Vec<_>>().join(" ")),
            build_timestamp: Some(chrono::Utc::now().to_rfc3339()),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    meta: GraphMeta,
    graph: Graph,
}

pub fn save_graph(path: impl AsRef<Path>, graph: &Graph, meta: &GraphMeta) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    w.write_all(&MAGIC)?;
    let snap = Snapshot { meta: meta.clone(), graph: graph.clone() };
    bincode::serialize_into(&mut w, &snap)?;
    w.flush()?;
    Ok(())
}

/// 读回快照并重新检查图的不变量
pub fn load_graph(path: impl AsRef<Path>) -> Result<(Graph, GraphMeta)> {
    let mut r = BufReader::new(File::open(path)?);
    let mut magic = [0u8; 4];
    std::io::Read::read_exact(&mut r, &mut magic)?;
    if magic != MAGIC {
        return Err(PgError::inconsistent("not a pgalign graph snapshot"));
    }
    let snap: Snapshot = bincode::deserialize_from(r)?;
    snap.graph.validate()?;
    Ok((snap.graph, snap.meta))
}
