//! 调校文件门户主入口
//! 认证、会话、限流与安全审计核心

use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tuning_portal::{
    auth::TokenService, config::AppConfig, db, handlers::health, middleware::AppState, routes,
    services, telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ===== CLI 参数处理 =====
    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "--version" => {
                println!("tuning-portal {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" => {
                print_help();
                return Ok(());
            }
            _ => {
                eprintln!("未知参数: {}", args[1]);
                print_help();
                std::process::exit(1);
            }
        }
    }

    // 加载 .env 文件（开发环境）
    // 生产环境应该直接设置环境变量，不依赖 .env 文件
    if let Ok(env_name) = std::env::var("TP_ENV") {
        dotenv::from_filename(format!(".env.{}", env_name)).ok();
    } else {
        dotenv::from_filename(".env.local").ok();
        dotenv::from_filename(".env.development").ok();
        dotenv::dotenv().ok();
    }

    // 设置应用启动时间
    health::set_start_time();

    // 1. 加载配置
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        anyhow::anyhow!("Failed to load configuration: {}", e)
    })?;

    // 2. 初始化日志与指标
    telemetry::init_telemetry(&config);
    telemetry::init_metrics();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Tuning portal starting...");

    // 3. 数据库连接池 + 迁移
    let db_pool = db::create_pool(&config.database).await?;
    db::run_migrations(&db_pool).await?;

    tracing::info!("Database initialized");

    // 4. 构建服务（按依赖顺序）
    let token_service = Arc::new(TokenService::from_config(&config)?);
    let security_service = Arc::new(services::SecurityService::new(
        db_pool.clone(),
        config.alerting.failed_login_threshold,
        config.alerting.failed_login_window_secs,
    ));
    let session_service = Arc::new(services::SessionService::new(
        db_pool.clone(),
        config.security.session_ttl_secs,
        security_service.clone(),
    ));
    let rate_limit_service = Arc::new(services::RateLimitService::new(
        db_pool.clone(),
        config.rate_limit.clone(),
        security_service.clone(),
    ));
    let ban_service = Arc::new(services::BanService::new(
        db_pool.clone(),
        security_service.clone(),
    ));
    let auth_service = Arc::new(services::AuthService::new(
        db_pool.clone(),
        token_service.clone(),
        session_service.clone(),
        rate_limit_service.clone(),
        security_service.clone(),
    ));

    let app_state = Arc::new(AppState {
        config: config.clone(),
        db: db_pool.clone(),
        token_service,
        auth_service,
        session_service: session_service.clone(),
        ban_service,
        rate_limit_service: rate_limit_service.clone(),
        security_service,
    });

    // 5. 后台清理：过期会话行与陈旧限流计数
    spawn_maintenance_task(session_service, rate_limit_service);

    // 6. 构建路由
    let app = routes::create_router(app_state.clone());

    // 7. 启动服务器
    let addr = &config.server.addr;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(
        addr = %addr,
        "Server listening"
    );

    // 8. 优雅关闭
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.graceful_shutdown_timeout_secs))
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// 周期清理任务；清理失败只记日志，不影响服务
fn spawn_maintenance_task(
    session_service: Arc<services::SessionService>,
    rate_limit_service: Arc<services::RateLimitService>,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(tokio::time::Duration::from_secs(3600));
        // 第一拍立即触发，跳过
        ticker.tick().await;

        loop {
            ticker.tick().await;

            match session_service.sweep_expired().await {
                Ok(swept) if swept > 0 => {
                    tracing::info!(swept, "Expired sessions swept");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Session sweep failed"),
            }

            if let Err(e) = rate_limit_service.purge_stale().await {
                tracing::warn!(error = %e, "Rate limit counter purge failed");
            }
        }
    });
}

/// 优雅关闭信号处理
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Terminate signal received, starting graceful shutdown");
        },
    }

    // 超时后强制关闭
    tokio::time::sleep(tokio::time::Duration::from_secs(timeout_secs)).await;
    tracing::warn!("Graceful shutdown timeout reached, forcing exit");
}

/// 打印帮助信息
fn print_help() {
    println!("tuning-portal {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("用法: tuning-portal [选项]");
    println!();
    println!("选项:");
    println!("  --version     打印版本信息并退出");
    println!("  --help        打印此帮助信息并退出");
    println!();
    println!("环境变量:");
    println!("  所有配置通过环境变量完成（前缀 TP_，层级分隔符 __）");
    println!("  例如 TP_SERVER__ADDR、TP_DATABASE__URL、TP_SECURITY__JWT_SECRET");
}
