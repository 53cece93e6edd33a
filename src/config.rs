//! 配置管理
//!
//! TOML 格式的引擎配置，所有字段都有默认值，缺失的配置文件按默认
//! 配置运行。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

/// 引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// 下载配置
    #[serde(default)]
    pub download: DownloadConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            download: DownloadConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// 下载配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// 默认下载目录
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    /// 最大同时下载数
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: usize,
    /// 分片工作池大小（所有下载共享）
    #[serde(default = "default_chunk_pool_size")]
    pub chunk_pool_size: usize,
    /// 每个文件的分片数
    #[serde(default = "default_split_count")]
    pub split_count: usize,
    /// 失败自动重试次数
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_max_concurrent_downloads() -> usize {
    5
}

fn default_chunk_pool_size() -> usize {
    6
}

fn default_split_count() -> usize {
    4
}

fn default_max_retries() -> u32 {
    0
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            max_concurrent_downloads: default_max_concurrent_downloads(),
            chunk_pool_size: default_chunk_pool_size(),
            split_count: default_split_count(),
            max_retries: default_max_retries(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            level: default_log_level(),
        }
    }
}

impl EngineConfig {
    /// 从 TOML 文件加载配置
    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("读取配置文件失败: {:?}", path))?;
        let config: EngineConfig =
            toml::from_str(&content).with_context(|| format!("解析配置文件失败: {:?}", path))?;
        Ok(config)
    }

    /// 保存配置到 TOML 文件
    pub async fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("创建配置目录失败: {:?}", parent))?;
        }
        let content = toml::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path, content)
            .await
            .with_context(|| format!("写入配置文件失败: {:?}", path))?;
        Ok(())
    }

    /// 加载配置，文件缺失或损坏时回退到默认配置
    pub async fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from_file(path).await {
            Ok(config) => config,
            Err(e) => {
                warn!("加载配置失败, 使用默认配置: {:#}", e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.download.max_concurrent_downloads, 5);
        assert_eq!(config.download.chunk_pool_size, 6);
        assert_eq!(config.download.split_count, 4);
        assert_eq!(config.download.max_retries, 0);
        assert!(config.log.enabled);
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("engine.toml");

        let mut config = EngineConfig::default();
        config.download.max_concurrent_downloads = 2;
        config.save_to_file(&path).await.unwrap();

        let loaded = EngineConfig::load_from_file(&path).await.unwrap();
        assert_eq!(loaded.download.max_concurrent_downloads, 2);
        assert_eq!(loaded.download.chunk_pool_size, 6);
    }

    #[tokio::test]
    async fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("engine.toml");
        tokio::fs::write(&path, "[download]\nsplit_count = 8\n")
            .await
            .unwrap();

        let config = EngineConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.download.split_count, 8);
        assert_eq!(config.download.max_concurrent_downloads, 5);
    }

    #[tokio::test]
    async fn test_load_or_default_on_missing_file() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig::load_or_default(dir.path().join("nope.toml")).await;
        assert_eq!(config.download.split_count, 4);
    }
}
