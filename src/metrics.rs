//! Prometheus 指标：请求量、错误量、封禁次数、回收数量等
//!
//! 未安装 Recorder 时所有记录函数都是空操作。

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::security::RequestClass;

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// 指标名称
const COUNTER_REQUESTS: &str = "edgeguard_requests_total";
const COUNTER_ERRORS: &str = "edgeguard_errors_total";
const COUNTER_BANS: &str = "edgeguard_bans_total";
const COUNTER_PERMANENT_BANS: &str = "edgeguard_permanent_bans_total";
const COUNTER_EVICTIONS: &str = "edgeguard_evictions_total";
const GAUGE_TRACKED_CLIENTS: &str = "edgeguard_tracked_clients";

/// 安装 Prometheus Recorder 并在 `addr` 上暴露抓取端点。
/// 需在 tokio 运行时内调用；重复调用会返回 Err。
pub fn init(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return Err("metrics already initialized".into());
    }
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    Ok(())
}

/// 记录一次被接受的请求
pub fn record_request(class: RequestClass) {
    metrics::counter!(COUNTER_REQUESTS, "class" => class.as_str()).increment(1);
}

/// 记录一条客户端错误（包括超速）
pub fn record_error() {
    metrics::counter!(COUNTER_ERRORS).increment(1);
}

/// 记录一次封禁升级，按阶梯位置打标签
pub fn record_ban(step: usize) {
    metrics::counter!(COUNTER_BANS, "step" => step.to_string()).increment(1);
}

pub fn record_permanent_ban() {
    metrics::counter!(COUNTER_PERMANENT_BANS).increment(1);
}

/// 记录一次清理回收的客户端数量
pub fn record_evictions(count: usize) {
    metrics::counter!(COUNTER_EVICTIONS).increment(count as u64);
}

/// 更新当前跟踪的客户端数量（Gauge）
pub fn record_tracked_clients(count: usize) {
    metrics::gauge!(GAUGE_TRACKED_CLIENTS).set(count as f64);
}
