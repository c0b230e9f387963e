use anyhow::Context;

use washline_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    washline_observability::init();

    let config = ApiConfig::from_env().context("invalid configuration")?;
    if config.insecure_jwt_secret {
        tracing::warn!("JWT_SECRET not set; using insecure dev default");
    }

    let app = washline_api::app::build_app(&config)
        .await
        .context("failed to start services")?;

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        shop_name = %config.shop_name,
        "listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
