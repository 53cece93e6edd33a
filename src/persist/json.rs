//! JSON 文件持久化
//!
//! 每个下载一个记录文件，存储键即文件名，扩展名为 `.record`：
//! ```json
//! {
//!   "request": { "url": "..." },
//!   "status": "idle",
//!   "chunks": [ ... ]
//! }
//! ```

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::{DownloadRecord, PersistAdapter};

/// 记录文件扩展名
const RECORD_EXTENSION: &str = "record";

/// 基于目录下 JSON 文件的持久化适配器
pub struct JsonFileAdapter {
    dir: PathBuf,
}

impl JsonFileAdapter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// 记录文件路径：`{dir}/{key}.record`
    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, RECORD_EXTENSION))
    }

    fn ensure_dir(&self) -> io::Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
            debug!("已创建记录目录: {:?}", self.dir);
        }
        Ok(())
    }

    fn load_from_path(path: &Path) -> Result<DownloadRecord> {
        let file = File::open(path).with_context(|| format!("打开记录文件失败: {:?}", path))?;
        let reader = BufReader::new(file);
        let record = serde_json::from_reader(reader)
            .with_context(|| format!("解析记录文件失败: {:?}", path))?;
        Ok(record)
    }
}

impl PersistAdapter for JsonFileAdapter {
    fn save(&self, record: &DownloadRecord) -> Result<()> {
        self.ensure_dir()?;

        let key = record.request.storage_key();
        let path = self.record_path(&key);

        // 先写入临时文件，再原子重命名（防止写入中断导致文件损坏）
        let temp_path = path.with_extension("record.tmp");

        let file = File::create(&temp_path)
            .with_context(|| format!("创建临时记录文件失败: {:?}", temp_path))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, record).context("序列化下载记录失败")?;
        writer.flush()?;
        drop(writer);

        fs::rename(&temp_path, &path)
            .with_context(|| format!("重命名记录文件失败: {:?}", path))?;

        debug!("已保存下载记录: {:?} (status={:?})", path, record.status);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.record_path(key);
        if path.exists() {
            fs::remove_file(&path).with_context(|| format!("删除记录文件失败: {:?}", path))?;
            debug!("已删除下载记录: {:?}", path);
        }
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<DownloadRecord>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        let mut skipped = 0;

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() || path.extension().is_none_or(|e| e != RECORD_EXTENSION) {
                continue;
            }
            match Self::load_from_path(&path) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!("跳过无效记录文件 {:?}: {:#}", path, e);
                    skipped += 1;
                }
            }
        }

        if skipped > 0 {
            warn!("扫描下载记录完成，跳过 {} 个无效文件", skipped);
        }
        debug!("扫描到 {} 条下载记录", records.len());
        Ok(records)
    }
}
