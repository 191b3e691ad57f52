//! 单飞锁
//!
//! 保证同一进程内每个键同时最多只有一个工厂函数在执行。
//! 第一个调用方成为执行者（`Owner`），其余调用方加入（`Joined`）并通过
//! `watch` 通道等待执行者的结果（包括错误）。
//!
//! 执行者的 `FlightGuard` 在析构时移除锁表中的条目，
//! 因此无论成功、失败、panic 还是取消，锁表都不会泄漏。

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::trace;

use crate::error::CacheError;

type Outcome<T> = Option<Result<T, CacheError>>;
type Slot = (String, String);

struct Flight<T> {
    id: u64,
    rx: watch::Receiver<Outcome<T>>,
}

/// 锁获取结果
pub enum Acquisition<T> {
    /// 当前调用方负责执行
    Owner(FlightGuard<T>),
    /// 已有执行在进行中
    Joined(FlightHandle<T>),
}

/// 单飞锁表
pub struct StampedeLock<T> {
    store: String,
    pending: Arc<DashMap<Slot, Flight<T>>>,
    next_id: AtomicU64,
}

impl<T: Clone + Send + Sync + 'static> StampedeLock<T> {
    pub fn new(store: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            pending: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// 获取键的执行权，或加入已有的执行
    pub fn acquire(&self, key: &str) -> Acquisition<T> {
        let slot = (self.store.clone(), key.to_string());

        match self.pending.entry(slot.clone()) {
            Entry::Occupied(entry) => {
                trace!("等待其他请求执行 store={}, key={}", self.store, key);
                Acquisition::Joined(FlightHandle {
                    rx: entry.get().rx.clone(),
                })
            }
            Entry::Vacant(entry) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = watch::channel(None);
                entry.insert(Flight { id, rx });

                Acquisition::Owner(FlightGuard {
                    slot,
                    id,
                    tx,
                    pending: Arc::clone(&self.pending),
                })
            }
        }
    }

    /// 正在执行的键数量
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// 键是否正在执行
    pub fn is_locked(&self, key: &str) -> bool {
        self.pending
            .contains_key(&(self.store.clone(), key.to_string()))
    }
}

/// 执行者持有的守卫
pub struct FlightGuard<T> {
    slot: Slot,
    id: u64,
    tx: watch::Sender<Outcome<T>>,
    pending: Arc<DashMap<Slot, Flight<T>>>,
}

impl<T> FlightGuard<T> {
    pub fn key(&self) -> &str {
        &self.slot.1
    }

    /// 发布执行结果并释放锁
    pub fn complete(self, outcome: Result<T, CacheError>) {
        let _ = self.tx.send(Some(outcome));
    }
}

impl<T> Drop for FlightGuard<T> {
    fn drop(&mut self) {
        let id = self.id;
        self.pending.remove_if(&self.slot, |_, flight| flight.id == id);
    }
}

/// 等待者持有的句柄
pub struct FlightHandle<T> {
    rx: watch::Receiver<Outcome<T>>,
}

impl<T: Clone> FlightHandle<T> {
    /// 等待执行者的结果
    pub async fn wait(mut self) -> Result<T, CacheError> {
        loop {
            if let Some(outcome) = self.rx.borrow_and_update().clone() {
                return outcome;
            }

            if self.rx.changed().await.is_err() {
                return match self.rx.borrow().clone() {
                    Some(outcome) => outcome,
                    None => Err(CacheError::Lock("执行者未返回结果即退出".to_string())),
                };
            }
        }
    }
}
