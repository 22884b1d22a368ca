//! 双向序列图及其距离查询。

pub mod distance;
pub mod model;

pub use distance::{shortest_gaps, DistanceTable};
pub use model::{Edge, Graph, Handle, Node, NodeId, Strand};
