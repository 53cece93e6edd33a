//! 分片模型与切分策略
//!
//! `Chunk` 描述目标文件的一个连续字节区间及其对应的分片文件路径。
//! `Splitter` 决定一个已知大小的文件切成多少片，默认实现为固定片数
//! 均分。

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 一个下载分片
///
/// `start`/`end` 为目标文件内的闭区间字节偏移。服务端不支持
/// Range 或文件大小未知时，整个下载退化为单个无区间分片，此时
/// `start`/`end` 均为 `None`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 分片序号（从 0 开始，同时决定合并顺序）
    pub index: usize,
    /// 区间起点（含）
    pub start: Option<u64>,
    /// 区间终点（含）
    pub end: Option<u64>,
    /// 分片数据落盘路径
    pub part_path: PathBuf,
}

impl Chunk {
    /// 区间字节数，无区间分片返回 `None`
    pub fn size(&self) -> Option<u64> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some(end - start + 1),
            _ => None,
        }
    }

    /// 是否带显式字节区间
    pub fn is_ranged(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }
}

/// 分片文件路径：`<目标文件>.part<序号>`
pub fn part_path(target: &Path, index: usize) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(&format!(".part{}", index));
    target.with_file_name(name)
}

/// 切分策略
///
/// 入参保证 `total_size > 0` 且服务端已确认支持 Range；无区间退化
/// 分片由上层直接构造，不经过切分器。
pub trait Splitter: Send + Sync {
    /// 把 `total_size` 字节切成覆盖完整、互不重叠、按序相邻的分片集
    fn split(&self, total_size: u64, target: &Path) -> Vec<Chunk>;
}

/// 固定片数均分切分器
///
/// 前 `total_size % count` 片各多分到一个字节，保证片间大小差不超过
/// 一字节；文件字节数少于片数时退化为每字节一片。
#[derive(Debug, Clone)]
pub struct FixedCountSplitter {
    count: usize,
}

impl FixedCountSplitter {
    /// 配置传 0 时按 1 处理
    pub fn new(count: usize) -> Self {
        Self { count: count.max(1) }
    }
}

impl Default for FixedCountSplitter {
    fn default() -> Self {
        Self::new(4)
    }
}

impl Splitter for FixedCountSplitter {
    fn split(&self, total_size: u64, target: &Path) -> Vec<Chunk> {
        let count = (self.count as u64).min(total_size) as usize;
        let base = total_size / count as u64;
        let extra = total_size % count as u64;

        let mut chunks = Vec::with_capacity(count);
        let mut start = 0u64;
        for index in 0..count {
            let size = base + if (index as u64) < extra { 1 } else { 0 };
            let end = start + size - 1;
            chunks.push(Chunk {
                index,
                start: Some(start),
                end: Some(end),
                part_path: part_path(target, index),
            });
            start = end + 1;
        }
        chunks
    }
}
