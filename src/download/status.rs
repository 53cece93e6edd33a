//! 下载状态与分片状态
//!
//! 两套状态都是带标签的不可变值对象：离散状态码 + 可选的失败原因。
//! 状态变更判定只比较状态码（判别式），不比较失败原因。

use crate::error::DownloadError;
use serde::{Deserialize, Serialize};

/// 单个分片的下载状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkDownloadStatus {
    /// 空闲（未开始或已暂停）
    Idle,
    /// 已提交到工作池，等待执行
    Pending,
    /// 正在传输
    Downloading,
    /// 传输失败
    Error(DownloadError),
    /// 分片完成
    Complete,
}

impl ChunkDownloadStatus {
    /// 状态码是否相同（忽略失败原因）
    pub fn same_kind(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// 失败原因（仅 Error 携带）
    pub fn cause(&self) -> Option<&DownloadError> {
        match self {
            ChunkDownloadStatus::Error(e) => Some(e),
            _ => None,
        }
    }

    /// 重启恢复时的状态归一化
    ///
    /// 进程重启后，处于中间态的分片（Pending/Downloading）不可能还在执行，
    /// 统一归位为 Idle；Error 与 Complete 保留。
    pub fn normalized_for_restore(self) -> Self {
        match self {
            ChunkDownloadStatus::Pending | ChunkDownloadStatus::Downloading => {
                ChunkDownloadStatus::Idle
            }
            other => other,
        }
    }
}

/// 整个下载的状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    /// 空闲（未开始或已暂停）
    Idle,
    /// 已请求启动，等待接纳许可
    Pending,
    /// 正在探测元数据 / 拆分分片
    Initializing,
    /// 分片已提交，等待工作池调度
    ChunkPending,
    /// 至少一个分片正在传输
    Downloading,
    /// 下载失败
    Error(DownloadError),
    /// 正在合并分片
    Merging,
    /// 合并失败（分片文件保留，可重试）
    MergeError(DownloadError),
    /// 已完成
    Complete,
}

impl DownloadStatus {
    /// 状态码是否相同（忽略失败原因）
    pub fn same_kind(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// 失败原因（Error / MergeError 携带）
    pub fn cause(&self) -> Option<&DownloadError> {
        match self {
            DownloadStatus::Error(e) | DownloadStatus::MergeError(e) => Some(e),
            _ => None,
        }
    }

    /// 是否为静止状态
    ///
    /// 静止状态下不会再有自发推进：接纳许可在此释放，销毁只在此进行。
    pub fn is_quiescent(&self) -> bool {
        matches!(
            self,
            DownloadStatus::Idle
                | DownloadStatus::Error(_)
                | DownloadStatus::MergeError(_)
                | DownloadStatus::Complete
        )
    }

    /// 重启恢复时的状态归一化
    ///
    /// 中间态（Pending..Merging）归位为 Idle；Error/MergeError/Complete 保留。
    pub fn normalized_for_restore(self) -> Self {
        match self {
            DownloadStatus::Pending
            | DownloadStatus::Initializing
            | DownloadStatus::ChunkPending
            | DownloadStatus::Downloading
            | DownloadStatus::Merging => DownloadStatus::Idle,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_kind_ignores_cause() {
        let a = DownloadStatus::Error(DownloadError::transfer("x"));
        let b = DownloadStatus::Error(DownloadError::transfer("y"));
        assert!(a.same_kind(&b));
        assert!(!a.same_kind(&DownloadStatus::MergeError(DownloadError::merge("z"))));
    }

    #[test]
    fn test_quiescent() {
        assert!(DownloadStatus::Idle.is_quiescent());
        assert!(DownloadStatus::Complete.is_quiescent());
        assert!(DownloadStatus::Error(DownloadError::probe("e")).is_quiescent());
        assert!(!DownloadStatus::Pending.is_quiescent());
        assert!(!DownloadStatus::Merging.is_quiescent());
    }

    #[test]
    fn test_normalize_for_restore() {
        assert_eq!(
            DownloadStatus::Downloading.normalized_for_restore(),
            DownloadStatus::Idle
        );
        assert_eq!(
            DownloadStatus::Complete.normalized_for_restore(),
            DownloadStatus::Complete
        );
        let err = DownloadStatus::Error(DownloadError::probe("e"));
        assert_eq!(err.clone().normalized_for_restore(), err);

        assert_eq!(
            ChunkDownloadStatus::Downloading.normalized_for_restore(),
            ChunkDownloadStatus::Idle
        );
        assert_eq!(
            ChunkDownloadStatus::Complete.normalized_for_restore(),
            ChunkDownloadStatus::Complete
        );
    }
}
