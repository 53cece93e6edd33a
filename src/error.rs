//! 下载错误类型
//!
//! 错误作为状态的一部分在状态机里流转（而不是跨线程抛出），
//! 因此要求 `Clone` + `Serialize`，负载统一用字符串描述。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 下载过程中的错误分类
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum DownloadError {
    /// 元数据探测失败（HEAD/GET 探测、Range 探测、变更检测）
    #[error("元数据探测失败: {0}")]
    Probe(String),
    /// 目标文件已存在，无法创建下载
    #[error("文件冲突: {0}")]
    FileConflict(String),
    /// 文件系统操作失败（建目录、建文件、删除分片等）
    #[error("文件系统操作失败: {0}")]
    Filesystem(String),
    /// 数据传输失败（网络流读取或分片写入）
    #[error("数据传输失败: {0}")]
    Transfer(String),
    /// 合并分片失败
    #[error("合并分片失败: {0}")]
    Merge(String),
}

impl DownloadError {
    /// 构造探测错误
    pub fn probe(msg: impl Into<String>) -> Self {
        DownloadError::Probe(msg.into())
    }

    /// 构造文件系统错误
    pub fn filesystem(msg: impl Into<String>) -> Self {
        DownloadError::Filesystem(msg.into())
    }

    /// 构造传输错误
    pub fn transfer(msg: impl Into<String>) -> Self {
        DownloadError::Transfer(msg.into())
    }

    /// 构造合并错误
    pub fn merge(msg: impl Into<String>) -> Self {
        DownloadError::Merge(msg.into())
    }

    /// 是否为文件冲突
    ///
    /// 冲突在目标文件被移走之前重试必然再次失败，不交给重试策略。
    pub fn is_conflict(&self) -> bool {
        matches!(self, DownloadError::FileConflict(_))
    }
}
