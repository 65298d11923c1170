/// 客户端访问状态机
///
/// 每个客户端身份（通常是来源 IP）对应一个 `ClientState`：
/// - 两类请求（普通 / 媒体）各自的滑动窗口计数
/// - 共享的错误日志（滑动窗口）
/// - 逐级升级的封禁阶梯（1m -> 5m -> 30m -> 1h -> 6h -> 12h -> 24h）
///
/// 所有操作都显式接收 `now`，本身不读取时钟。
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 滑动窗口长度（请求与错误共用）
pub const ROLLING_WINDOW_SECS: i64 = 60;
/// 不活跃多久后记录可被回收
pub const INACTIVITY_TTL_SECS: i64 = 5 * 60;
/// 封禁结束多久后记录可被回收
pub const BAN_RETENTION_SECS: i64 = 24 * 60 * 60;

/// 封禁时长阶梯（秒），严格递增
pub const BAN_LADDER_SECS: [i64; 7] = [
    60,
    5 * 60,
    30 * 60,
    60 * 60,
    6 * 60 * 60,
    12 * 60 * 60,
    24 * 60 * 60,
];

/// 超出请求速率时记录的错误原因
pub const REASON_TOO_MANY_REQUESTS: &str = "Too many requests";
/// 速率限制全为 0 时记录的错误原因
pub const REASON_FORBIDDEN: &str = "Request from this IP forbidden";

/// 请求类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestClass {
    /// 普通请求（消息）
    Primary,
    /// 媒体请求
    Secondary,
}

impl RequestClass {
    pub const ALL: [RequestClass; 2] = [RequestClass::Primary, RequestClass::Secondary];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestClass::Primary => "messages",
            RequestClass::Secondary => "media",
        }
    }

    fn index(self) -> usize {
        match self {
            RequestClass::Primary => 0,
            RequestClass::Secondary => 1,
        }
    }
}

/// 宽松解析：只有 "media" / "secondary" 被识别为媒体请求，其余一律视为普通请求
impl From<&str> for RequestClass {
    fn from(value: &str) -> Self {
        match value {
            "media" | "secondary" => RequestClass::Secondary,
            _ => RequestClass::Primary,
        }
    }
}

impl fmt::Display for RequestClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 限额：`-1` 表示不限
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Limit {
    Unlimited,
    Max(u32),
}

impl Limit {
    /// `count` 是否超出限额
    pub fn is_exceeded_by(self, count: usize) -> bool {
        match self {
            Limit::Unlimited => false,
            Limit::Max(max) => count > max as usize,
        }
    }

    pub fn is_zero(self) -> bool {
        self == Limit::Max(0)
    }
}

impl TryFrom<i64> for Limit {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Limit::Unlimited),
            n if n >= 0 => u32::try_from(n)
                .map(Limit::Max)
                .map_err(|_| format!("limit {} is out of range", n)),
            n => Err(format!(
                "invalid limit {}: expected -1 (unlimited) or a non-negative integer",
                n
            )),
        }
    }
}

impl From<Limit> for i64 {
    fn from(limit: Limit) -> Self {
        match limit {
            Limit::Unlimited => -1,
            Limit::Max(max) => i64::from(max),
        }
    }
}

impl FromStr for Limit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: i64 = s
            .trim()
            .parse()
            .map_err(|_| format!("invalid limit {:?}: not an integer", s))?;
        Limit::try_from(value)
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", i64::from(*self))
    }
}

/// 单个客户端的最终生效限额
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientLimits {
    /// 普通请求每分钟上限
    pub rpm: Limit,
    /// 媒体请求每分钟上限
    pub media_rpm: Limit,
    /// 普通请求错误容忍数
    pub errors_limit: Limit,
    /// 媒体请求错误容忍数
    pub media_errors_limit: Limit,
}

impl ClientLimits {
    pub fn request_limit(&self, class: RequestClass) -> Limit {
        match class {
            RequestClass::Primary => self.rpm,
            RequestClass::Secondary => self.media_rpm,
        }
    }

    /// 错误日志两类请求共用，因此只有一个合并预算：取两者中更严格的有限值
    pub fn error_budget(&self) -> Limit {
        match (self.errors_limit, self.media_errors_limit) {
            (Limit::Max(a), Limit::Max(b)) => Limit::Max(a.min(b)),
            (Limit::Max(a), Limit::Unlimited) | (Limit::Unlimited, Limit::Max(a)) => {
                Limit::Max(a)
            }
            (Limit::Unlimited, Limit::Unlimited) => Limit::Unlimited,
        }
    }

    /// 两类请求速率都为 0：永久禁止
    pub fn is_forbidden(&self) -> bool {
        self.rpm.is_zero() && self.media_rpm.is_zero()
    }
}

/// 错误记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub reason: String,
    /// 触发错误的上下文（通常是请求 URL）
    pub context: String,
    pub at: DateTime<Utc>,
}

/// 一次封禁升级的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BanDecision {
    /// 阶梯位置（从 0 开始）
    pub step: usize,
    pub duration: Duration,
    pub until: DateTime<Utc>,
}

/// 记录请求/错误的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// 已被封禁，本次记录被忽略
    Ignored,
    /// 正常记录
    Accepted,
    /// 超出速率，已记录一条错误但未触发封禁
    RateExceeded,
    /// 触发了封禁升级
    Escalated(BanDecision),
}

/// 客户端状态（诊断用快照）
#[derive(Debug, Clone, Serialize)]
pub struct ClientSnapshot {
    pub limits: ClientLimits,
    pub rpm: usize,
    pub media_rpm: usize,
    pub errors: Vec<ErrorRecord>,
    pub banned: bool,
    pub permanent_ban: bool,
    pub ban_until: Option<DateTime<Utc>>,
    pub ban_step: Option<usize>,
    pub remaining_ban: Option<String>,
    pub last_activity: DateTime<Utc>,
}

/// 单个客户端的可变状态
#[derive(Debug, Clone)]
pub struct ClientState {
    limits: ClientLimits,
    /// 按请求类别索引的请求时间戳（升序）
    requests: [VecDeque<DateTime<Utc>>; 2],
    /// 错误日志（升序）
    errors: VecDeque<ErrorRecord>,
    ban_until: Option<DateTime<Utc>>,
    permanent_ban: bool,
    /// 当前所处的封禁阶梯位置，`None` 表示从未被封禁
    ban_step: Option<usize>,
    last_activity: DateTime<Utc>,
}

impl ClientState {
    pub fn new(limits: ClientLimits, now: DateTime<Utc>) -> Self {
        let mut state = Self {
            limits,
            requests: [VecDeque::new(), VecDeque::new()],
            errors: VecDeque::new(),
            ban_until: None,
            permanent_ban: false,
            ban_step: None,
            last_activity: now,
        };

        if limits.is_forbidden() {
            state.permanent_ban = true;
            state.record_error(REASON_FORBIDDEN, "", now);
        }

        state
    }

    pub fn limits(&self) -> &ClientLimits {
        &self.limits
    }

    pub fn is_banned(&self, now: DateTime<Utc>) -> bool {
        self.permanent_ban || self.ban_until.is_some_and(|until| until > now)
    }

    pub fn is_permanently_banned(&self) -> bool {
        self.permanent_ban
    }

    pub fn ban_step(&self) -> Option<usize> {
        self.ban_step
    }

    pub fn ban_until(&self) -> Option<DateTime<Utc>> {
        self.ban_until
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    /// 窗口内的错误条数（已裁剪部分除外）
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.errors.iter()
    }

    /// 当前窗口内某类请求的数量
    pub fn current_rate(&self, class: RequestClass, now: DateTime<Utc>) -> usize {
        let cutoff = window_start(now);
        self.requests[class.index()]
            .iter()
            .filter(|ts| **ts > cutoff)
            .count()
    }

    /// 记录一次请求
    pub fn record_request(
        &mut self,
        class: RequestClass,
        context: &str,
        now: DateTime<Utc>,
    ) -> RecordOutcome {
        // 被封禁的客户端不再累积任何计数
        if self.is_banned(now) {
            return RecordOutcome::Ignored;
        }

        let log = &mut self.requests[class.index()];
        log.push_back(now);
        self.last_activity = now;

        prune_front(log, window_start(now), |ts| *ts);
        let rate = log.len();

        if !self.limits.request_limit(class).is_exceeded_by(rate) {
            return RecordOutcome::Accepted;
        }

        match self.record_error(REASON_TOO_MANY_REQUESTS, context, now) {
            RecordOutcome::Escalated(ban) => RecordOutcome::Escalated(ban),
            _ => RecordOutcome::RateExceeded,
        }
    }

    /// 记录一次错误，错误数超出合并预算时升级封禁
    pub fn record_error(&mut self, reason: &str, context: &str, now: DateTime<Utc>) -> RecordOutcome {
        self.errors.push_back(ErrorRecord {
            reason: reason.to_string(),
            context: context.to_string(),
            at: now,
        });
        prune_front(&mut self.errors, window_start(now), |record| record.at);

        if self.limits.error_budget().is_exceeded_by(self.errors.len()) {
            if let Some(ban) = self.escalate_ban(now) {
                return RecordOutcome::Escalated(ban);
            }
        }

        RecordOutcome::Accepted
    }

    /// 封禁升级：阶梯位置只进不退，到顶后重复最后一级
    pub fn escalate_ban(&mut self, now: DateTime<Utc>) -> Option<BanDecision> {
        if self.permanent_ban {
            return None;
        }

        let last = BAN_LADDER_SECS.len() - 1;
        let step = self.ban_step.map_or(0, |step| (step + 1).min(last));
        let duration = Duration::seconds(BAN_LADDER_SECS[step]);
        let until = now + duration;

        self.ban_step = Some(step);
        self.ban_until = Some(until);

        Some(BanDecision {
            step,
            duration,
            until,
        })
    }

    /// 剩余封禁时长（HH:MM:SS），仅用于给客户端的提示
    pub fn remaining_ban_duration(&self, now: DateTime<Utc>) -> Option<String> {
        if self.permanent_ban {
            return None;
        }

        let left = self.ban_until? - now;
        if left <= Duration::zero() {
            return None;
        }

        Some(format_hms(left))
    }

    /// 是否可以被回收：长时间不活跃，且封禁早已结束
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let inactive = self.last_activity < now - Duration::seconds(INACTIVITY_TTL_SECS);
        let ban_expired = self
            .ban_until
            .map_or(true, |until| until < now - Duration::seconds(BAN_RETENTION_SECS));

        inactive && ban_expired
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> ClientSnapshot {
        let cutoff = window_start(now);
        ClientSnapshot {
            limits: self.limits,
            rpm: self.current_rate(RequestClass::Primary, now),
            media_rpm: self.current_rate(RequestClass::Secondary, now),
            errors: self
                .errors
                .iter()
                .filter(|record| record.at > cutoff)
                .cloned()
                .collect(),
            banned: self.is_banned(now),
            permanent_ban: self.permanent_ban,
            ban_until: self.ban_until,
            ban_step: self.ban_step,
            remaining_ban: self.remaining_ban_duration(now),
            last_activity: self.last_activity,
        }
    }
}

fn window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::seconds(ROLLING_WINDOW_SECS)
}

/// 从头部裁剪所有不晚于 `cutoff` 的条目；日志升序，遇到第一个窗口内条目即停止
fn prune_front<T>(
    log: &mut VecDeque<T>,
    cutoff: DateTime<Utc>,
    timestamp: impl Fn(&T) -> DateTime<Utc>,
) {
    while log.front().is_some_and(|entry| timestamp(entry) <= cutoff) {
        log.pop_front();
    }
}

fn format_hms(duration: Duration) -> String {
    let total = duration.num_seconds();
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(rpm: i64, media_rpm: i64, errors: i64, media_errors: i64) -> ClientLimits {
        ClientLimits {
            rpm: Limit::try_from(rpm).unwrap(),
            media_rpm: Limit::try_from(media_rpm).unwrap(),
            errors_limit: Limit::try_from(errors).unwrap(),
            media_errors_limit: Limit::try_from(media_errors).unwrap(),
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_limit_parsing() {
        assert_eq!(Limit::try_from(-1).unwrap(), Limit::Unlimited);
        assert_eq!(Limit::try_from(0).unwrap(), Limit::Max(0));
        assert!(Limit::try_from(-2).is_err());
        assert_eq!("30".parse::<Limit>().unwrap(), Limit::Max(30));
        assert!("abc".parse::<Limit>().is_err());
        assert_eq!(i64::from(Limit::Unlimited), -1);
    }

    #[test]
    fn test_request_class_normalization() {
        assert_eq!(RequestClass::from("media"), RequestClass::Secondary);
        assert_eq!(RequestClass::from("messages"), RequestClass::Primary);
        assert_eq!(RequestClass::from("rss"), RequestClass::Primary);
        assert_eq!(RequestClass::from(""), RequestClass::Primary);
    }

    #[test]
    fn test_error_budget_is_combined() {
        assert_eq!(limits(10, 10, 3, 5).error_budget(), Limit::Max(3));
        assert_eq!(limits(10, 10, -1, 5).error_budget(), Limit::Max(5));
        assert_eq!(limits(10, 10, 2, -1).error_budget(), Limit::Max(2));
        assert_eq!(limits(10, 10, -1, -1).error_budget(), Limit::Unlimited);
    }

    #[test]
    fn test_forbidden_client_is_permanently_banned() {
        let now = t0();
        let mut state = ClientState::new(limits(0, 0, 5, 5), now);

        assert!(state.is_banned(now));
        assert!(state.is_permanently_banned());
        assert_eq!(state.error_count(), 1);
        assert_eq!(state.errors().next().unwrap().reason, REASON_FORBIDDEN);

        // 永久封禁不会过期，也不会显示剩余时间
        let later = now + Duration::days(30);
        assert!(state.is_banned(later));
        assert_eq!(state.remaining_ban_duration(later), None);
        assert_eq!(state.escalate_ban(later), None);
        assert_eq!(
            state.record_request(RequestClass::Primary, "/x", later),
            RecordOutcome::Ignored
        );
    }

    #[test]
    fn test_single_zero_rate_is_not_forbidden() {
        let now = t0();
        let state = ClientState::new(limits(0, 10, 0, 0), now);
        assert!(!state.is_banned(now));
        assert_eq!(state.error_count(), 0);
    }

    #[test]
    fn test_one_error_per_request_over_limit() {
        let now = t0();
        let mut state = ClientState::new(limits(2, 10, -1, -1), now);

        assert_eq!(state.record_request(RequestClass::Primary, "/a", now), RecordOutcome::Accepted);
        assert_eq!(state.record_request(RequestClass::Primary, "/a", now), RecordOutcome::Accepted);
        for i in 0..5 {
            assert_eq!(
                state.record_request(RequestClass::Primary, "/a", now),
                RecordOutcome::RateExceeded
            );
            assert_eq!(state.error_count(), i + 1);
        }
        assert!(state.errors().all(|e| e.reason == REASON_TOO_MANY_REQUESTS && e.context == "/a"));
        // 错误预算不限，不会封禁
        assert!(!state.is_banned(now));
    }

    #[test]
    fn test_unlimited_rate_never_errors() {
        let now = t0();
        let mut state = ClientState::new(limits(-1, -1, 0, 0), now);
        for _ in 0..1000 {
            assert_eq!(
                state.record_request(RequestClass::Secondary, "/m", now),
                RecordOutcome::Accepted
            );
        }
        assert_eq!(state.current_rate(RequestClass::Secondary, now), 1000);
        assert_eq!(state.error_count(), 0);
    }

    #[test]
    fn test_classes_are_counted_independently() {
        let now = t0();
        let mut state = ClientState::new(limits(1, 1, -1, -1), now);

        assert_eq!(state.record_request(RequestClass::Primary, "/a", now), RecordOutcome::Accepted);
        assert_eq!(state.record_request(RequestClass::Secondary, "/m", now), RecordOutcome::Accepted);
        assert_eq!(state.current_rate(RequestClass::Primary, now), 1);
        assert_eq!(state.current_rate(RequestClass::Secondary, now), 1);
        assert_eq!(
            state.record_request(RequestClass::Secondary, "/m", now),
            RecordOutcome::RateExceeded
        );
    }

    #[test]
    fn test_rate_and_ban_scenario() {
        let now = t0();
        let mut state = ClientState::new(limits(2, 2, 1, 1), now);

        state.record_request(RequestClass::Primary, "/a", now);
        state.record_request(RequestClass::Primary, "/a", now);
        assert_eq!(
            state.record_request(RequestClass::Primary, "/a", now),
            RecordOutcome::RateExceeded
        );

        let outcome = state.record_request(RequestClass::Primary, "/a", now);
        let RecordOutcome::Escalated(ban) = outcome else {
            panic!("expected escalation, got {:?}", outcome);
        };
        assert_eq!(ban.step, 0);
        assert_eq!(ban.duration, Duration::seconds(60));
        assert_eq!(ban.until, now + Duration::seconds(60));

        assert!(state.is_banned(now));
        assert!(state.is_banned(now + Duration::seconds(59)));
        // banUntil 当刻已不算封禁
        assert!(!state.is_banned(now + Duration::seconds(60)));
        assert!(!state.is_banned(now + Duration::seconds(61)));
    }

    #[test]
    fn test_banned_client_does_not_extend_window() {
        let now = t0();
        let mut state = ClientState::new(limits(1, 1, 0, 0), now);

        state.record_request(RequestClass::Primary, "/a", now);
        assert!(matches!(
            state.record_request(RequestClass::Primary, "/a", now),
            RecordOutcome::Escalated(_)
        ));

        let later = now + Duration::seconds(10);
        assert_eq!(state.record_request(RequestClass::Primary, "/a", later), RecordOutcome::Ignored);
        assert_eq!(state.current_rate(RequestClass::Primary, later), 2);
        assert_eq!(state.last_activity(), now);
    }

    #[test]
    fn test_ladder_advances_and_saturates() {
        let now = t0();
        let mut state = ClientState::new(limits(10, 10, 0, 0), now);

        let mut steps = Vec::new();
        for _ in 0..10 {
            let ban = state.escalate_ban(now).unwrap();
            steps.push(ban.duration.num_seconds());
        }

        assert_eq!(&steps[..7], &BAN_LADDER_SECS[..]);
        assert!(steps[7..].iter().all(|s| *s == 24 * 60 * 60));
        assert_eq!(state.ban_step(), Some(BAN_LADDER_SECS.len() - 1));
    }

    #[test]
    fn test_escalation_within_active_ban_is_monotonic() {
        let now = t0();
        let mut state = ClientState::new(limits(10, 10, 0, 0), now);

        state.record_error("upstream failed", "/a", now);
        assert_eq!(state.ban_step(), Some(0));

        // 封禁期间继续上报错误，阶梯继续前进
        let mut previous = 0;
        for i in 1..5 {
            state.record_error("upstream failed", "/a", now + Duration::seconds(i));
            let step = state.ban_step().unwrap();
            assert!(step > previous);
            previous = step;
        }
    }

    #[test]
    fn test_step_retained_after_ban_expires() {
        let now = t0();
        let mut state = ClientState::new(limits(10, 10, 0, 0), now);

        state.record_error("upstream failed", "/a", now);
        assert_eq!(state.ban_step(), Some(0));

        let after = now + Duration::seconds(120);
        assert!(!state.is_banned(after));
        assert_eq!(state.ban_step(), Some(0));

        let outcome = state.record_error("upstream failed", "/a", after);
        let RecordOutcome::Escalated(ban) = outcome else {
            panic!("expected escalation, got {:?}", outcome);
        };
        assert_eq!(ban.step, 1);
        assert_eq!(ban.duration, Duration::minutes(5));
    }

    #[test]
    fn test_pruning_respects_window_boundary() {
        let now = t0();
        let mut state = ClientState::new(limits(-1, -1, -1, -1), now);

        state.record_request(RequestClass::Primary, "/a", now);
        state.record_request(RequestClass::Primary, "/a", now + Duration::seconds(30));

        // 59 秒后：两条都在窗口内
        let t = now + Duration::seconds(59);
        state.record_request(RequestClass::Primary, "/a", t);
        assert_eq!(state.current_rate(RequestClass::Primary, t), 3);

        // 正好 60 秒：第一条落到窗口边界外
        let t = now + Duration::seconds(60);
        state.record_request(RequestClass::Primary, "/a", t);
        assert_eq!(state.current_rate(RequestClass::Primary, t), 3);

        // 91 秒：只剩 59s 与 60s 两条，再加本次
        let t = now + Duration::seconds(91);
        state.record_request(RequestClass::Primary, "/a", t);
        assert_eq!(state.current_rate(RequestClass::Primary, t), 3);
        assert_eq!(state.snapshot(t).rpm, 3);
    }

    #[test]
    fn test_errors_expire_from_window() {
        let now = t0();
        let mut state = ClientState::new(limits(10, 10, 1, 1), now);

        state.record_error("upstream failed", "/a", now);
        assert_eq!(state.error_count(), 1);

        // 一分钟后旧错误被裁剪，新错误不会超出预算
        let later = now + Duration::seconds(61);
        assert_eq!(
            state.record_error("upstream failed", "/a", later),
            RecordOutcome::Accepted
        );
        assert_eq!(state.error_count(), 1);
        assert!(!state.is_banned(later));
    }

    #[test]
    fn test_remaining_ban_duration_format() {
        let now = t0();
        let mut state = ClientState::new(limits(10, 10, 0, 0), now);
        assert_eq!(state.remaining_ban_duration(now), None);

        state.escalate_ban(now);
        assert_eq!(state.remaining_ban_duration(now).as_deref(), Some("00:01:00"));
        assert_eq!(
            state.remaining_ban_duration(now + Duration::seconds(15)).as_deref(),
            Some("00:00:45")
        );
        assert_eq!(state.remaining_ban_duration(now + Duration::seconds(60)), None);

        for _ in 0..6 {
            state.escalate_ban(now);
        }
        assert_eq!(state.remaining_ban_duration(now).as_deref(), Some("24:00:00"));
    }

    #[test]
    fn test_stale_detection() {
        let now = t0();
        let mut state = ClientState::new(limits(10, 10, 0, 0), now);
        state.record_request(RequestClass::Primary, "/a", now);

        assert!(!state.is_stale(now + Duration::minutes(4)));
        assert!(state.is_stale(now + Duration::minutes(6)));

        // 处于封禁中的客户端即使长期不活跃也不可回收
        state.escalate_ban(now);
        for _ in 0..6 {
            state.escalate_ban(now);
        }
        assert!(!state.is_stale(now + Duration::hours(23)));
        assert!(!state.is_stale(now + Duration::hours(47)));
        assert!(state.is_stale(now + Duration::hours(49)));
    }

    #[test]
    fn test_snapshot_reports_state() {
        let now = t0();
        let mut state = ClientState::new(limits(1, 5, 0, 0), now);
        state.record_request(RequestClass::Secondary, "/m", now);
        state.record_request(RequestClass::Primary, "/a", now);
        state.record_request(RequestClass::Primary, "/a", now);

        let snapshot = state.snapshot(now);
        assert_eq!(snapshot.rpm, 2);
        assert_eq!(snapshot.media_rpm, 1);
        assert_eq!(snapshot.errors.len(), 1);
        assert!(snapshot.banned);
        assert_eq!(snapshot.ban_step, Some(0));
        assert_eq!(snapshot.remaining_ban.as_deref(), Some("00:01:00"));

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["limits"]["rpm"], 1);
        assert_eq!(json["limits"]["errors_limit"], 0);
    }
}
