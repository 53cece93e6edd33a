//! 下载请求
//!
//! `Request` 是调用方提供的不可变值，按值相等作为一个下载在管理器里的
//! 外部身份键。header 使用 `BTreeMap` 保证相等与哈希与插入顺序无关。

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// 下载请求（值语义，可作为注册表键）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Request {
    url: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    /// 目标目录覆盖（缺省用管理器的默认目录）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    destination: Option<PathBuf>,
    /// 文件名覆盖（缺省用服务端探测到的文件名）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_name: Option<String>,
}

impl Request {
    /// 创建请求构建器
    pub fn builder(url: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            url: url.into(),
            headers: BTreeMap::new(),
            destination: None,
            file_name: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn destination(&self) -> Option<&Path> {
        self.destination.as_deref()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// 持久化存储键
    ///
    /// 由请求全量内容的 SHA-1 摘要派生，同一请求在进程重启后映射到
    /// 同一条持久化记录。
    pub fn storage_key(&self) -> String {
        let mut hasher = Sha1::new();
        hasher.update(self.url.as_bytes());
        for (k, v) in &self.headers {
            hasher.update(k.as_bytes());
            hasher.update(b":");
            hasher.update(v.as_bytes());
        }
        if let Some(dest) = &self.destination {
            hasher.update(dest.to_string_lossy().as_bytes());
        }
        if let Some(name) = &self.file_name {
            hasher.update(name.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// `Request` 构建器
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    url: String,
    headers: BTreeMap<String, String>,
    destination: Option<PathBuf>,
    file_name: Option<String>,
}

impl RequestBuilder {
    /// 追加一个请求头
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// 指定目标目录
    pub fn destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// 指定保存文件名
    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn build(self) -> Request {
        Request {
            url: self.url,
            headers: self.headers,
            destination: self.destination,
            file_name: self.file_name,
        }
    }
}
