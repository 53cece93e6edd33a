//! 下载元数据
//!
//! `DownloadInfo` 在初始化阶段探测得到，之后只会被整体替换（重新探测时），
//! 不做逐字段修改。

use serde::{Deserialize, Serialize};

/// 初始探测信息（来自 HEAD/GET 响应头）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitInfo {
    /// 服务端文件名（Content-Disposition 或 URL 末段）
    pub file_name: String,
    /// Last-Modified 凭据，用于后续变更检测
    pub last_modified: Option<String>,
    /// 内容长度（字节），未知时为 -1
    pub content_length: i64,
    /// MIME 类型
    pub mime_type: Option<String>,
}

/// Range 支持探测信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeInfo {
    /// 服务端是否接受字节范围请求
    pub range_supportable: bool,
    /// 是否为 chunked 传输编码
    pub chunked: bool,
}

/// 一次下载的完整元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadInfo {
    /// 初始探测信息
    pub init_info: InitInfo,
    /// Range 支持信息
    pub range_info: RangeInfo,
    /// 创建时间（Unix 毫秒时间戳）
    pub create_time: i64,
    /// 自上次探测以来服务端文件是否发生过变更
    pub server_file_changed: bool,
}

impl DownloadInfo {
    /// 构造新的元数据（首次初始化）
    pub fn new(init_info: InitInfo, range_info: RangeInfo) -> Self {
        Self {
            init_info,
            range_info,
            create_time: chrono::Utc::now().timestamp_millis(),
            server_file_changed: false,
        }
    }

    /// 重新探测后的整体替换（保留创建时间，标记文件已变更）
    pub fn replaced(&self, init_info: InitInfo, range_info: RangeInfo) -> Self {
        Self {
            init_info,
            range_info,
            create_time: self.create_time,
            server_file_changed: true,
        }
    }
}
