use anyhow::Result;

use dashboard_gateway::{config, routes};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let config = config::Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    if config.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    tracing::info!("🚀 Dashboard Gateway starting...");
    tracing::info!(
        "Server configured: {}:{}",
        config.server_host,
        config.server_port
    );
    tracing::debug!("Refresh mode: {:?}", config.refresh_mode);

    // Process-wide backend, refresh coordinator and API client
    let app_state = routes::AppState::from_config(config.clone())?;
    tracing::info!("✅ Auth backend client initialized for {}", config.api_url);

    let app = routes::app(app_state);

    // Bind to configured host and port
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // Print startup banner
    print_startup_banner(&config);

    // Start server with graceful shutdown
    tracing::info!("🚀 Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("👋 Server shutdown complete");

    Ok(())
}

/// Print startup banner
fn print_startup_banner(config: &config::Config) {
    let banner = r#"
╔═══════════════════════════════════════════════════════════╗
║                                                           ║
║                  🔐 Dashboard Gateway                     ║
║                                                           ║
║  Cookie sessions, token refresh and the dashboard API    ║
║                                                           ║
╚═══════════════════════════════════════════════════════════╝
"#;

    println!("{}", banner);
    println!("  Version:       {}", env!("CARGO_PKG_VERSION"));
    println!(
        "  Server:        http://{}:{}",
        config.server_host, config.server_port
    );
    println!("  Backend:       {}", config.api_url);
    println!(
        "  Protected:     {} (login at {})",
        config.protected_prefix, config.login_path
    );
    println!(
        "  Cookies:       {:?}{}",
        config.cookie_same_site,
        if config.cookie_secure { ", Secure" } else { "" }
    );
    println!("  Refresh Mode:  {:?}", config.refresh_mode);
    println!("  Log Level:     {}", config.log_level);
    println!();
}

/// Handle graceful shutdown signal
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
