/// 访问控制模块
///
/// 按客户端身份（通常是来源 IP）做准入控制和逐级封禁：
/// - 两类请求（普通 / 媒体）独立的每分钟速率限制
/// - 超速或下游失败计为错误，一分钟内错误数超出预算则封禁
/// - 封禁时长按阶梯递增（1m -> 5m -> 30m -> 1h -> 6h -> 12h -> 24h）
/// - 定时回收长时间不活跃且未处于封禁期的客户端
pub mod access_controller;
pub mod client_state;
pub mod clock;
pub mod sweeper;

pub use access_controller::AccessController;
pub use client_state::{
    BanDecision, ClientLimits, ClientSnapshot, ClientState, ErrorRecord, Limit, RecordOutcome,
    RequestClass, BAN_LADDER_SECS,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use sweeper::Sweeper;
