//! 读入序列、保存 / 读取图快照。

pub mod reads;
pub mod store;

pub use reads::{SeqReader, SeqRecord};
pub use store::{load_graph, save_graph, GraphMeta};
