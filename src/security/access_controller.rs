/// 访问控制器
///
/// 持有 `身份 -> ClientState` 映射，是服务层唯一的入口：
/// - `is_banned` / `check`：准入判断
/// - `record_request`：记录已放行的请求
/// - `record_error`：上报下游失败
/// - `sweep`：周期性回收过期记录
///
/// ## 并发模型
///
/// 映射使用 DashMap（分片锁），每条记录再包一层 `parking_lot::Mutex`：
/// - 首次访问通过 `entry()` 在分片写锁下完成，同一身份只会创建一条记录
/// - 修改时持有分片读锁 + 记录锁，不同身份之间互不阻塞
/// - 回收先快照候选，再用 `remove_if` 在分片写锁 + 记录锁下二次确认，
///   因此不会回收一条正在被修改的记录
///
/// 加锁顺序固定为「分片锁 -> 记录锁」。
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::Ref;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::client_state::{
    ClientLimits, ClientSnapshot, ClientState, RecordOutcome, RequestClass,
};
use super::clock::{Clock, SystemClock};
use crate::config::AccessConfig;
use crate::error::AccessError;
use crate::metrics;

pub struct AccessController {
    clients: DashMap<String, Mutex<ClientState>>,
    config: AccessConfig,
    clock: Arc<dyn Clock>,
}

impl AccessController {
    pub fn new(config: AccessConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: AccessConfig, clock: Arc<dyn Clock>) -> Self {
        info!(
            "🛡️ AccessController initialized: rpm={}, media_rpm={}, errors_limit={}, media_errors_limit={}, overrides={}",
            config.rpm,
            config.media_rpm,
            config.errors_limit,
            config.media_errors_limit,
            config.clients_settings.len()
        );
        Self {
            clients: DashMap::new(),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    /// 某个身份的最终限额（不创建记录）
    pub fn limits_for(&self, identity: &str) -> ClientLimits {
        self.config.limits_for(identity)
    }

    /// 当前跟踪的客户端数量
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.clients.contains_key(identity)
    }

    /// 获取或懒创建记录，返回时持有分片读锁
    fn get_or_create(&self, identity: &str, now: DateTime<Utc>) -> Ref<'_, String, Mutex<ClientState>> {
        if let Some(existing) = self.clients.get(identity) {
            return existing;
        }

        match self.clients.entry(identity.to_owned()) {
            Entry::Occupied(entry) => entry.into_ref().downgrade(),
            Entry::Vacant(entry) => {
                let limits = self.config.limits_for(identity);
                let state = ClientState::new(limits, now);
                if state.is_permanently_banned() {
                    warn!("🚫 Client {} is permanently forbidden by configuration", identity);
                    metrics::record_permanent_ban();
                } else {
                    debug!("New client {}: {:?}", identity, limits);
                }
                entry.insert(Mutex::new(state)).downgrade()
            }
        }
    }

    /// 在记录锁下执行一次读写
    fn with_client<R>(
        &self,
        identity: &str,
        f: impl FnOnce(&mut ClientState, DateTime<Utc>) -> R,
    ) -> R {
        let now = self.clock.now();
        let entry = self.get_or_create(identity, now);
        let mut state = entry.value().lock();
        f(&mut state, now)
    }

    /// 是否处于封禁中（首次访问会按配置创建记录）
    pub fn is_banned(&self, identity: &str) -> bool {
        self.with_client(identity, |state, now| state.is_banned(now))
    }

    /// 准入检查：封禁时返回带剩余时长的错误
    pub fn check(&self, identity: &str) -> Result<(), AccessError> {
        self.with_client(identity, |state, now| {
            if state.is_permanently_banned() {
                Err(AccessError::Forbidden)
            } else if state.is_banned(now) {
                Err(AccessError::Banned {
                    remaining: state.remaining_ban_duration(now),
                })
            } else {
                Ok(())
            }
        })
    }

    /// 记录一次已放行的请求
    pub fn record_request(
        &self,
        identity: &str,
        class: impl Into<RequestClass>,
        context: &str,
    ) -> RecordOutcome {
        let class = class.into();
        let outcome =
            self.with_client(identity, |state, now| state.record_request(class, context, now));

        match outcome {
            RecordOutcome::Ignored => {}
            RecordOutcome::Accepted => {
                metrics::record_request(class);
            }
            RecordOutcome::RateExceeded => {
                debug!("Client {} exceeded {} rate: {}", identity, class, context);
                metrics::record_request(class);
                metrics::record_error();
            }
            RecordOutcome::Escalated(ban) => {
                warn!(
                    "⛔ Client {} banned for {}s (step {}) after exceeding {} rate",
                    identity,
                    ban.duration.num_seconds(),
                    ban.step,
                    class
                );
                metrics::record_request(class);
                metrics::record_error();
                metrics::record_ban(ban.step);
            }
        }

        outcome
    }

    /// 上报一次由客户端引起的下游失败；已封禁的客户端直接忽略
    pub fn record_error(&self, identity: &str, reason: &str, context: &str) -> RecordOutcome {
        let outcome = self.with_client(identity, |state, now| {
            if state.is_banned(now) {
                RecordOutcome::Ignored
            } else {
                state.record_error(reason, context, now)
            }
        });

        match outcome {
            RecordOutcome::Ignored => {}
            RecordOutcome::Escalated(ban) => {
                warn!(
                    "⛔ Client {} banned for {}s (step {}): {} ({})",
                    identity,
                    ban.duration.num_seconds(),
                    ban.step,
                    reason,
                    context
                );
                metrics::record_error();
                metrics::record_ban(ban.step);
            }
            _ => {
                debug!("Client {} error: {} ({})", identity, reason, context);
                metrics::record_error();
            }
        }

        outcome
    }

    /// 剩余封禁时长（HH:MM:SS），仅用于诊断；不会创建记录
    pub fn remaining_ban_duration(&self, identity: &str) -> Option<String> {
        let now = self.clock.now();
        let entry = self.clients.get(identity)?;
        let state = entry.value().lock();
        state.remaining_ban_duration(now)
    }

    /// 诊断快照；不会创建记录
    pub fn snapshot(&self, identity: &str) -> Option<ClientSnapshot> {
        let now = self.clock.now();
        let entry = self.clients.get(identity)?;
        let state = entry.value().lock();
        Some(state.snapshot(now))
    }

    /// 回收所有过期记录，返回回收数量
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();

        // 1. 快照候选（不在遍历中删除，避免分片锁重入）
        let candidates: Vec<String> = self
            .clients
            .iter()
            .filter(|entry| entry.value().lock().is_stale(now))
            .map(|entry| entry.key().clone())
            .collect();

        // 2. 在分片写锁 + 记录锁下再次确认后删除
        let evicted = candidates
            .iter()
            .filter(|identity| {
                self.clients
                    .remove_if(identity.as_str(), |_, state| state.lock().is_stale(now))
                    .is_some()
            })
            .count();

        let remaining = self.clients.len();
        if evicted > 0 {
            info!("🧹 Evicted {} stale clients, {} remaining", evicted, remaining);
            metrics::record_evictions(evicted);
        } else {
            debug!("Sweep finished, {} clients tracked", remaining);
        }
        metrics::record_tracked_clients(remaining);

        evicted
    }
}
