//! 核心库错误类型。
//!
//! 所有失败都以 [`PgError`] 返回给调用方，不会终止进程。
//! "没有种子 / 没有链" 属于正常的空结果，不在此列。

/// 核心库错误
#[derive(thiserror::Error, Debug)]
pub enum PgError {
    /// 参数非法（k、w、reward、空 query 等）
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// 边、拆分或种子引用了不存在的节点
    #[error("invalid reference: {0}")]
    InvalidReference(String),
    /// 必需的转移在图中不存在可达路径
    #[error("no path: {0}")]
    NoPath(String),
    /// 图修改会破坏邻接不变量
    #[error("inconsistent graph: {0}")]
    InconsistentGraph(String),
    /// 图快照读写失败
    #[error("graph store: {0}")]
    Io(#[from] std::io::Error),
    #[error("graph store: {0}")]
    Codec(#[from] bincode::Error),
}

impl PgError {
    pub(crate) fn param(msg: impl Into<String>) -> Self {
        PgError::InvalidParameter(msg.into())
    }

    pub(crate) fn reference(msg: impl Into<String>) -> Self {
        PgError::InvalidReference(msg.into())
    }

    pub(crate) fn no_path(msg: impl Into<String>) -> Self {
        PgError::NoPath(msg.into())
    }

    pub(crate) fn inconsistent(msg: impl Into<String>) -> Self {
        PgError::InconsistentGraph(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, PgError>;
