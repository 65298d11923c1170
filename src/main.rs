use anyhow::{Context, Result};
use edgeguard::{
    cli::{Cli, Commands},
    config::{self, EdgeConfig},
    logging, metrics, AccessController, Sweeper,
};
use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // 加载 .env 文件（如果存在）
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::GenerateConfig { path }) => return generate_config(path),
        Some(Commands::ValidateConfig { path }) => return validate_config(path),
        Some(Commands::ShowConfig) => return show_config(&cli),
        Some(Commands::Inspect { identity }) => return inspect(&cli, identity),
        Some(Commands::Run) | None => {}
    }

    // 快速读取 config.toml 的 [logging] 段（不加载完整配置）
    let early_log = config::load_early_logging_config(cli.config_file.as_deref());

    // 合并日志配置（优先级：CLI > config.toml > 默认值）
    let log_level = cli
        .get_log_level()
        .or(early_log.level)
        .unwrap_or_else(|| "info".to_string());
    let log_format = cli.get_log_format().or(early_log.format);
    let log_file = cli.log_file.clone().or(early_log.file);

    let _log_guard = logging::init_logging(
        &log_level,
        log_format.as_deref(),
        log_file.as_deref(),
        cli.quiet,
    )?;

    // 该进程不接收请求：只托管周期清理与指标端点，准入判断由嵌入 AccessController 的服务完成
    tracing::info!("🚀 edgeguard starting (sweep loop only, embed AccessController to serve requests)...");

    let config = EdgeConfig::load(&cli).context("加载配置失败")?;

    tracing::info!("📊 Access Configuration:");
    tracing::info!("  - RPM: {}", config.access.rpm);
    tracing::info!("  - Media RPM: {}", config.access.media_rpm);
    tracing::info!("  - Errors Limit: {}", config.access.errors_limit);
    tracing::info!("  - Media Errors Limit: {}", config.access.media_errors_limit);
    tracing::info!("  - Client Overrides: {}", config.access.clients_settings.len());
    tracing::info!("  - Cleanup Interval: {}s", config.access.cleanup_interval_secs);

    if config.metrics.enabled {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics.port));
        match metrics::init(addr) {
            Ok(()) => tracing::info!("📈 Prometheus metrics listening on {}", addr),
            Err(e) => tracing::warn!("⚠️ 无法启动监控指标: {}", e),
        }
    }

    let period = config.access.cleanup_interval();
    let controller = Arc::new(AccessController::new(config.access));
    let sweeper = Sweeper::spawn(controller.clone(), period);

    tokio::signal::ctrl_c()
        .await
        .context("无法监听退出信号")?;

    tracing::info!("🛑 Shutting down, {} clients tracked", controller.len());
    sweeper.shutdown().await;

    Ok(())
}

/// 生成默认配置文件
fn generate_config(path: &str) -> Result<()> {
    fs::write(path, config::DEFAULT_CONFIG_TOML)
        .with_context(|| format!("无法写入配置文件: {}", path))?;

    println!("✅ 配置文件已生成: {}", path);
    Ok(())
}

/// 验证配置文件
fn validate_config(path: &str) -> Result<()> {
    let config = EdgeConfig::from_toml_file(path)
        .with_context(|| format!("配置文件验证失败: {}", path))?;

    println!("✅ 配置文件有效: {}", path);
    println!("📊 配置摘要:");
    println!("  - RPM: {}", config.access.rpm);
    println!("  - Media RPM: {}", config.access.media_rpm);
    println!("  - Errors Limit: {}", config.access.errors_limit);
    println!("  - Media Errors Limit: {}", config.access.media_errors_limit);
    println!("  - Client Overrides: {}", config.access.clients_settings.len());

    Ok(())
}

/// 显示最终配置（合并后的配置）
fn show_config(cli: &Cli) -> Result<()> {
    let config = EdgeConfig::load(cli).context("加载配置失败")?;

    println!("📊 最终配置（合并后的配置）:");
    println!("{}", serde_json::to_string_pretty(&config)?);

    Ok(())
}

/// 显示某个客户端最终生效的限额
fn inspect(cli: &Cli, identity: &str) -> Result<()> {
    let config = EdgeConfig::load(cli).context("加载配置失败")?;
    let limits = config.access.limits_for(identity);

    println!("{}", serde_json::to_string_pretty(&limits)?);
    if limits.is_forbidden() {
        println!("🚫 {} 被永久禁止访问", identity);
    }

    Ok(())
}
