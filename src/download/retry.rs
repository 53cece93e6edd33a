//! 重试策略
//!
//! 下载进入错误态时由策略决定是否自动重启。文件冲突类错误不经过
//! 策略，总是要求用户介入。

use crate::error::DownloadError;
use parking_lot::Mutex;
use std::collections::HashMap;

/// 重试策略
pub trait RetryPolicy: Send + Sync {
    /// 某个下载因 `error` 进入错误态，返回 `true` 则自动重启
    fn should_retry(&self, key: &str, error: &DownloadError) -> bool;

    /// 下载成功完成或被删除时清空其重试预算
    fn reset(&self, key: &str);
}

/// 固定预算重试策略
///
/// 每个下载维护独立的剩余重试次数，预算为 0 时等价于从不重试。
/// 预算耗尽的那次失败浮出为终态错误，同时归还预算，人工重启后
/// 重新按完整预算重试。
#[derive(Debug)]
pub struct SimpleRetryPolicy {
    budget: u32,
    remaining: Mutex<HashMap<String, u32>>,
}

impl SimpleRetryPolicy {
    pub fn new(budget: u32) -> Self {
        Self {
            budget,
            remaining: Mutex::new(HashMap::new()),
        }
    }
}

impl RetryPolicy for SimpleRetryPolicy {
    fn should_retry(&self, key: &str, error: &DownloadError) -> bool {
        if error.is_conflict() {
            return false;
        }
        let mut remaining = self.remaining.lock();
        let left = remaining.entry(key.to_string()).or_insert(self.budget);
        if *left == 0 {
            // 拒绝即归还预算：错误态浮出后的人工重启重新享有完整预算
            remaining.remove(key);
            return false;
        }
        *left -= 1;
        true
    }

    fn reset(&self, key: &str) {
        self.remaining.lock().remove(key);
    }
}
