use thiserror::Error;

/// 准入检查错误
///
/// 由 `AccessController::check` 返回，供服务层转换成响应。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// 配置为永久禁止的客户端
    #[error("Forbidden: requests from this client are not allowed")]
    Forbidden,
    /// 临时封禁中
    #[error("Too many requests or errors: banned{}", ban_suffix(.remaining))]
    Banned {
        /// 剩余封禁时长（HH:MM:SS）
        remaining: Option<String>,
    },
}

/// 配置错误（仅在启动阶段出现，属于致命错误）
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("无法读取配置文件 {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("配置文件格式错误: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("环境变量 {name} 无效: {reason}")]
    Env { name: String, reason: String },
    #[error("配置无效: {0}")]
    Invalid(String),
}

fn ban_suffix(remaining: &Option<String>) -> String {
    remaining
        .as_deref()
        .map(|r| format!(" for {}", r))
        .unwrap_or_default()
}

impl AccessError {
    /// 对应的 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            AccessError::Forbidden => 403,
            AccessError::Banned { .. } => 429,
        }
    }
}
