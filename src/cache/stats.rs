//! 缓存统计

use std::sync::atomic::{AtomicU64, Ordering};

/// 缓存统计信息
#[derive(Debug, Default)]
pub struct CacheStats {
    /// L1 命中次数
    local_hits: AtomicU64,
    /// L2 命中次数
    remote_hits: AtomicU64,
    /// 未命中次数
    misses: AtomicU64,
    /// 工厂函数调用次数
    factory_calls: AtomicU64,
    /// 工厂函数失败次数
    factory_errors: AtomicU64,
    /// 返回优雅保留旧值的次数
    stale_served: AtomicU64,
    /// 后台提前刷新次数
    early_refreshes: AtomicU64,
    /// 被吞掉的远程错误次数
    remote_errors_suppressed: AtomicU64,
    /// 收到的失效事件次数
    invalidations_received: AtomicU64,
}

impl CacheStats {
    pub fn local_hits(&self) -> u64 {
        self.local_hits.load(Ordering::Relaxed)
    }

    pub fn remote_hits(&self) -> u64 {
        self.remote_hits.load(Ordering::Relaxed)
    }

    pub fn hits(&self) -> u64 {
        self.local_hits() + self.remote_hits()
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn factory_calls(&self) -> u64 {
        self.factory_calls.load(Ordering::Relaxed)
    }

    pub fn factory_errors(&self) -> u64 {
        self.factory_errors.load(Ordering::Relaxed)
    }

    pub fn stale_served(&self) -> u64 {
        self.stale_served.load(Ordering::Relaxed)
    }

    pub fn early_refreshes(&self) -> u64 {
        self.early_refreshes.load(Ordering::Relaxed)
    }

    pub fn remote_errors_suppressed(&self) -> u64 {
        self.remote_errors_suppressed.load(Ordering::Relaxed)
    }

    pub fn invalidations_received(&self) -> u64 {
        self.invalidations_received.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }

    /// 重置所有计数
    pub fn reset(&self) {
        for counter in [
            &self.local_hits,
            &self.remote_hits,
            &self.misses,
            &self.factory_calls,
            &self.factory_errors,
            &self.stale_served,
            &self.early_refreshes,
            &self.remote_errors_suppressed,
            &self.invalidations_received,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_local_hit(&self) {
        self.local_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_remote_hit(&self) {
        self.remote_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_factory_call(&self) {
        self.factory_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_factory_error(&self) {
        self.factory_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stale_served(&self) {
        self.stale_served.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_early_refresh(&self) {
        self.early_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_remote_error_suppressed(&self) {
        self.remote_errors_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_invalidation(&self) {
        self.invalidations_received.fetch_add(1, Ordering::Relaxed);
    }
}
