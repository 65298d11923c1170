use clap::{Parser, Subcommand};

impl Cli {
    /// 解析命令行参数
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}

/// edgeguard - 按客户端身份的准入控制与逐级封禁
///
/// 准入判断由嵌入服务进程的 `AccessController` 完成；本程序只负责配置工具
/// 以及运行周期清理和指标端点，本身不接收请求。
#[derive(Parser, Debug, Default)]
#[command(name = "edgeguard")]
#[command(version)]
#[command(
    about = "Per-client admission control with escalating bans (library; this binary hosts config tools and the sweep loop)",
    long_about = None
)]
pub struct Cli {
    /// 配置文件路径
    #[arg(long, value_name = "FILE", help = "指定配置文件路径")]
    pub config_file: Option<String>,

    /// 过期客户端清理间隔
    #[arg(long, value_name = "SECS", help = "过期客户端清理间隔（秒）")]
    pub cleanup_interval: Option<u64>,

    /// 日志级别
    #[arg(
        long,
        value_name = "LEVEL",
        help = "日志级别: trace, debug, info, warn, error"
    )]
    pub log_level: Option<String>,

    /// 日志格式
    #[arg(long, value_name = "FORMAT", help = "日志格式: pretty, json, compact")]
    pub log_format: Option<String>,

    /// 日志文件路径
    #[arg(long, value_name = "PATH", help = "日志输出文件路径")]
    pub log_file: Option<String>,

    /// 启用监控指标
    #[arg(long, help = "启用 Prometheus 监控指标")]
    pub enable_metrics: bool,

    /// 监控端口
    #[arg(long, value_name = "PORT", help = "监控指标服务端口")]
    pub metrics_port: Option<u16>,

    /// 详细输出（可重复使用：-v, -vv, -vvv）
    #[arg(short, action = clap::ArgAction::Count, help = "详细输出级别")]
    pub verbose: u8,

    /// 静默模式
    #[arg(long, short = 'q', help = "静默模式（只输出错误）")]
    pub quiet: bool,

    /// 子命令
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 运行周期清理循环与指标端点（默认）；不接收请求，控制器需以库的形式嵌入服务
    Run,
    /// 生成默认配置文件
    GenerateConfig {
        /// 输出文件路径
        #[arg(value_name = "PATH", default_value = "config.toml")]
        path: String,
    },
    /// 验证配置文件
    ValidateConfig {
        /// 配置文件路径
        #[arg(value_name = "PATH", default_value = "config.toml")]
        path: String,
    },
    /// 显示最终配置（合并后的配置）
    ShowConfig,
    /// 显示某个客户端最终生效的限额
    Inspect {
        /// 客户端标识（如 IP）
        #[arg(value_name = "IDENTITY")]
        identity: String,
    },
}

impl Cli {
    /// 获取日志级别（考虑 verbose 和 quiet）
    pub fn get_log_level(&self) -> Option<String> {
        if self.quiet {
            return Some("error".to_string());
        }

        if let Some(level) = &self.log_level {
            return Some(level.clone());
        }

        match self.verbose {
            0 => None,
            1 => Some("info".to_string()),
            2 => Some("debug".to_string()),
            _ => Some("trace".to_string()),
        }
    }

    pub fn get_log_format(&self) -> Option<String> {
        self.log_format.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_precedence() {
        let cli = Cli::try_parse_from(["edgeguard", "-vv"]).unwrap();
        assert_eq!(cli.get_log_level().as_deref(), Some("debug"));

        let cli = Cli::try_parse_from(["edgeguard", "-vv", "--log-level", "warn"]).unwrap();
        assert_eq!(cli.get_log_level().as_deref(), Some("warn"));

        let cli = Cli::try_parse_from(["edgeguard", "-q", "--log-level", "warn"]).unwrap();
        assert_eq!(cli.get_log_level().as_deref(), Some("error"));

        let cli = Cli::try_parse_from(["edgeguard"]).unwrap();
        assert_eq!(cli.get_log_level(), None);
    }

    #[test]
    fn test_run_help_states_it_does_not_serve_requests() {
        use clap::CommandFactory;

        let command = Cli::command();
        let about = command.get_about().map(|s| s.to_string()).unwrap_or_default();
        assert!(about.contains("library"));

        let run = command.find_subcommand("run").unwrap();
        let run_about = run.get_about().map(|s| s.to_string()).unwrap_or_default();
        assert!(run_about.contains("不接收请求"));
    }

    #[test]
    fn test_inspect_subcommand() {
        let cli = Cli::try_parse_from(["edgeguard", "inspect", "10.0.0.1"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Inspect { ref identity }) if identity == "10.0.0.1"
        ));
    }
}
