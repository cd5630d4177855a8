use anyhow::Context;
use std::sync::Arc;
use tradetrace::{
    Address, Coin, Config, DataSource, HyperliquidDataSource, LeaderboardRanker,
    LeaderboardRequest,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env().context("Configuration error")?;

    let known_users: Vec<Address> = config
        .leaderboard_users
        .iter()
        .map(|u| Address::new(u.clone()))
        .collect();
    let datasource: Arc<dyn DataSource> = Arc::new(
        HyperliquidDataSource::new(config.hyperliquid_api_url.clone())
            .with_known_users(known_users),
    );

    let ranker = LeaderboardRanker::from_config(datasource, &config);
    let request = LeaderboardRequest::new(
        Coin::new(config.leaderboard_coin.clone()),
        config.leaderboard_metric,
    )
    .with_builder_only(config.builder_only);

    tracing::info!(
        coin = %request.coin,
        metric = ?request.metric,
        builder_only = request.builder_only,
        "Ranking leaderboard"
    );

    let entries = ranker.rank(&request).await.context("Leaderboard failed")?;
    println!("{}", serde_json::to_string_pretty(&entries)?);

    Ok(())
}
