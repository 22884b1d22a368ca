//! # pgalign
//!
//! 泛基因组序列图比对器：把 query 比对到双向序列图上，并把比对结果作为新路径并入图中。
//!
//! 流程自底向上：
//!
//! - **图模型**：节点存序列，边连接有向节点端；支持拆分节点并同步改写边与路径
//! - **种子查找**：节点序列的 minimizer 索引，查找 query 上的精确匹配
//! - **链构建**：按 query 偏移有序、图上可达的最高分种子子序列
//! - **序列比对**：锚点之间在图上枚举路径做仿射间隙 DP，输出逐碱基编辑脚本
//! - **图扩充**：拆分节点、插入新节点，形成 bubble
//!
//! ## 快速示例
//!
//! ```rust
//! use pgalign::align::{align_query, AlignOpt};
//! use pgalign::augment::add_alignment;
//! use pgalign::graph::Graph;
//!
//! let graph = Graph::from_sequence("ref", b"ACGTACGT").unwrap();
//! let opt = AlignOpt { k: 3, w: 2, ..AlignOpt::default() };
//! let res = align_query(&graph, b"ACGTACGT", &opt, None).unwrap();
//! assert_eq!(res.cigar(), "8=");
//!
//! let graph = add_alignment(&graph, b"ACGTACGT", &res.edits, "read1").unwrap();
//! assert_eq!(graph.node_count(), 1);
//! assert_eq!(graph.path_count(), 2);
//! ```
//!
//! ## 模块说明
//!
//! - [`graph`]：双向序列图、节点拆分、距离表
//! - [`align`]：minimizer 种子、链构建、图上 DP 比对、编辑脚本
//! - [`augment`]：把编辑脚本并入图
//! - [`io`]：FASTA / FASTQ 解析，图快照读写
//! - [`util`]：序列规范化、反向互补
//! - [`error`]：错误类型

pub mod align;
pub mod augment;
pub mod error;
pub mod graph;
pub mod io;
pub mod util;

pub use error::{PgError, Result};
