use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::security::{ClientLimits, Limit};

/// 默认配置文件内容（`generate-config` 输出）
pub const DEFAULT_CONFIG_TOML: &str = r#"# edgeguard 配置文件
# 此文件由 edgeguard generate-config 生成

[access]
# 每分钟请求上限，-1 表示不限
rpm = 15
media_rpm = 15
# 一分钟内可容忍的错误数，超出后逐级封禁；-1 表示不限
errors_limit = 0
media_errors_limit = 0
# 过期客户端清理间隔（秒）
cleanup_interval_secs = 60

# 按客户端覆盖（未填写的字段回退到上面的默认值）
# [access.clients_settings."127.0.0.1"]
# rpm = -1
# media_rpm = -1
# errors_limit = -1
# media_errors_limit = -1

# 全部速率为 0 表示永久禁止
# [access.clients_settings."203.0.113.7"]
# rpm = 0
# media_rpm = 0

[logging]
level = "info"
format = "compact"
# file = "./logs/edgeguard.log"

[metrics]
enabled = false
port = 9090
"#;

/// 完整配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConfig {
    pub access: AccessConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// 访问控制配置（启动时解析，之后只读）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessConfig {
    /// 普通请求每分钟上限
    pub rpm: Limit,
    /// 媒体请求每分钟上限
    pub media_rpm: Limit,
    /// 普通请求错误容忍数
    pub errors_limit: Limit,
    /// 媒体请求错误容忍数
    pub media_errors_limit: Limit,
    /// 过期客户端清理间隔（秒）
    pub cleanup_interval_secs: u64,
    /// 按客户端身份覆盖
    pub clients_settings: HashMap<String, ClientOverride>,
}

/// 单个客户端的部分覆盖
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientOverride {
    pub rpm: Option<Limit>,
    pub media_rpm: Option<Limit>,
    pub errors_limit: Option<Limit>,
    pub media_errors_limit: Option<Limit>,
}

/// 默认清理间隔（秒）
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;

impl AccessConfig {
    /// 四项全局默认限额没有内置值，必须显式给出
    pub fn new(rpm: Limit, media_rpm: Limit, errors_limit: Limit, media_errors_limit: Limit) -> Self {
        Self {
            rpm,
            media_rpm,
            errors_limit,
            media_errors_limit,
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
            clients_settings: HashMap::new(),
        }
    }

    /// 解析某个客户端的最终限额
    ///
    /// 普通类：覆盖值 -> 全局默认；
    /// 媒体类：媒体覆盖值 -> 普通覆盖值 -> 全局媒体默认。
    pub fn limits_for(&self, identity: &str) -> ClientLimits {
        let over = self.clients_settings.get(identity);

        ClientLimits {
            rpm: over.and_then(|o| o.rpm).unwrap_or(self.rpm),
            media_rpm: over
                .and_then(|o| o.media_rpm.or(o.rpm))
                .unwrap_or(self.media_rpm),
            errors_limit: over
                .and_then(|o| o.errors_limit)
                .unwrap_or(self.errors_limit),
            media_errors_limit: over
                .and_then(|o| o.media_errors_limit.or(o.errors_limit))
                .unwrap_or(self.media_errors_limit),
        }
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cleanup_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "access.cleanup_interval_secs 必须大于 0".to_string(),
            ));
        }
        if self.clients_settings.keys().any(|id| id.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "access.clients_settings 中存在空的客户端标识".to_string(),
            ));
        }
        Ok(())
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: Option<String>,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: None,
            file: None,
        }
    }
}

/// Prometheus 指标配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}

impl EdgeConfig {
    /// 从 TOML 字符串加载
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let toml_config: TomlConfig = toml::from_str(content)?;
        let config = Self::try_from(toml_config)?;
        config.access.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件加载
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_toml_str(&read_config_file(path.as_ref())?)
    }

    /// 从命令行参数合并
    pub fn merge_from_cli(&mut self, cli: &crate::cli::Cli) {
        if let Some(level) = cli.get_log_level() {
            self.logging.level = level;
        }
        if let Some(format) = cli.get_log_format() {
            self.logging.format = Some(format);
        }
        if let Some(file) = &cli.log_file {
            self.logging.file = Some(file.clone());
        }
        if let Some(secs) = cli.cleanup_interval {
            self.access.cleanup_interval_secs = secs;
        }
        if cli.enable_metrics {
            self.metrics.enabled = true;
        }
        if let Some(port) = cli.metrics_port {
            self.metrics.port = port;
        }
    }

    /// 加载配置（按优先级：命令行 > 环境变量 > 配置文件）
    ///
    /// 四项全局默认限额必须由配置文件或环境变量提供，缺失时启动失败。
    pub fn load(cli: &crate::cli::Cli) -> Result<Self, ConfigError> {
        let mut toml_config: TomlConfig = match &cli.config_file {
            Some(path) => toml::from_str(&read_config_file(Path::new(path))?)?,
            None if Path::new("config.toml").exists() => {
                toml::from_str(&read_config_file(Path::new("config.toml"))?)?
            }
            None => TomlConfig::default(),
        };

        toml_config.merge_from_env()?;
        let mut config = Self::try_from(toml_config)?;
        config.merge_from_cli(cli);
        config.access.validate()?;

        Ok(config)
    }
}

fn read_config_file(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn env_limit(name: &str) -> Result<Option<Limit>, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse::<Limit>()
            .map(Some)
            .map_err(|reason| ConfigError::Env {
                name: name.to_string(),
                reason,
            }),
        Err(_) => Ok(None),
    }
}

/// TOML 配置文件结构（用于反序列化）
#[derive(Debug, Default, Deserialize)]
struct TomlConfig {
    access: Option<TomlAccessConfig>,
    logging: Option<TomlLoggingConfig>,
    metrics: Option<TomlMetricsConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlAccessConfig {
    rpm: Option<Limit>,
    media_rpm: Option<Limit>,
    errors_limit: Option<Limit>,
    media_errors_limit: Option<Limit>,
    cleanup_interval_secs: Option<u64>,
    clients_settings: Option<HashMap<String, ClientOverride>>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlLoggingConfig {
    level: Option<String>,
    format: Option<String>,
    file: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TomlMetricsConfig {
    enabled: Option<bool>,
    port: Option<u16>,
}

impl TomlConfig {
    /// 从环境变量合并（EDGEGUARD_ 前缀），优先级高于配置文件
    fn merge_from_env(&mut self) -> Result<(), ConfigError> {
        let access = self.access.get_or_insert_with(TomlAccessConfig::default);
        if let Some(limit) = env_limit("EDGEGUARD_RPM")? {
            access.rpm = Some(limit);
        }
        if let Some(limit) = env_limit("EDGEGUARD_MEDIA_RPM")? {
            access.media_rpm = Some(limit);
        }
        if let Some(limit) = env_limit("EDGEGUARD_ERRORS_LIMIT")? {
            access.errors_limit = Some(limit);
        }
        if let Some(limit) = env_limit("EDGEGUARD_MEDIA_ERRORS_LIMIT")? {
            access.media_errors_limit = Some(limit);
        }
        if let Ok(value) = env::var("EDGEGUARD_CLEANUP_INTERVAL") {
            let secs = value.trim().parse().map_err(|_| ConfigError::Env {
                name: "EDGEGUARD_CLEANUP_INTERVAL".to_string(),
                reason: format!("{:?} 不是有效的秒数", value),
            })?;
            access.cleanup_interval_secs = Some(secs);
        }
        if let Ok(level) = env::var("EDGEGUARD_LOG_LEVEL") {
            self.logging.get_or_insert_with(TomlLoggingConfig::default).level = Some(level);
        }
        Ok(())
    }
}

fn required(value: Option<Limit>, key: &str) -> Result<Limit, ConfigError> {
    value.ok_or_else(|| ConfigError::Invalid(format!("缺少必填项 access.{}", key)))
}

impl TryFrom<TomlConfig> for EdgeConfig {
    type Error = ConfigError;

    fn try_from(toml: TomlConfig) -> Result<Self, Self::Error> {
        let access = toml.access.unwrap_or_default();
        let mut access_config = AccessConfig::new(
            required(access.rpm, "rpm")?,
            required(access.media_rpm, "media_rpm")?,
            required(access.errors_limit, "errors_limit")?,
            required(access.media_errors_limit, "media_errors_limit")?,
        );
        if let Some(secs) = access.cleanup_interval_secs {
            access_config.cleanup_interval_secs = secs;
        }
        if let Some(clients) = access.clients_settings {
            access_config.clients_settings = clients;
        }

        let mut config = Self {
            access: access_config,
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        };

        if let Some(logging) = toml.logging {
            if let Some(level) = logging.level {
                config.logging.level = level;
            }
            config.logging.format = logging.format;
            config.logging.file = logging.file;
        }

        if let Some(metrics) = toml.metrics {
            if let Some(enabled) = metrics.enabled {
                config.metrics.enabled = enabled;
            }
            if let Some(port) = metrics.port {
                config.metrics.port = port;
            }
        }

        Ok(config)
    }
}

/// 早期日志配置（在完整配置加载前初始化日志用）
#[derive(Debug, Default)]
pub struct EarlyLoggingConfig {
    pub level: Option<String>,
    pub format: Option<String>,
    pub file: Option<String>,
}

/// 只读取配置文件的 [logging] 段，读取失败时返回空配置
pub fn load_early_logging_config(config_file: Option<&str>) -> EarlyLoggingConfig {
    #[derive(Deserialize)]
    struct LoggingOnly {
        logging: Option<TomlLoggingConfig>,
    }

    let path = config_file.unwrap_or("config.toml");
    let Ok(content) = fs::read_to_string(path) else {
        return EarlyLoggingConfig::default();
    };

    match toml::from_str::<LoggingOnly>(&content) {
        Ok(LoggingOnly {
            logging: Some(logging),
        }) => EarlyLoggingConfig {
            level: logging.level,
            format: logging.format,
            file: logging.file,
        },
        _ => EarlyLoggingConfig::default(),
    }
}
