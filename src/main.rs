use std::net::SocketAddr;
use std::path::PathBuf;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
    use safewatch::{
        api,
        auth::AuthService,
        decode::Decoder,
        safety::{RateLimitConfig, RateLimiter},
        simulate::{Simulator, TenderlyConfig},
        store::Store,
        AppState, PaymentsConfig,
    };

    let data_dir = PathBuf::from(env_str("DATA_DIR").unwrap_or_else(|| "data".to_string()));
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(error = %e, dir = %data_dir.display(), "could not create data directory");
        std::process::exit(1);
    }

    let db_path = data_dir.join("safewatch.db");
    let store = match Store::open(&db_path) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, path = %db_path.display(), "could not open database");
            std::process::exit(1);
        }
    };
    tracing::info!(path = %db_path.display(), "database ready");

    let auth = AuthService::from_data_dir(&data_dir);

    let tenderly = match (
        env_str("TENDERLY_ACCESS_KEY"),
        env_str("TENDERLY_ACCOUNT"),
        env_str("TENDERLY_PROJECT"),
    ) {
        (Some(access_key), Some(account), Some(project)) => Some(TenderlyConfig {
            access_key,
            account,
            project,
        }),
        _ => None,
    };
    tracing::info!(
        tenderly_configured = tenderly.is_some(),
        etherscan_configured = env_str("ETHERSCAN_API_KEY").is_some(),
        "simulation providers"
    );

    let mut state = AppState::new(store, auth);
    state.decoder = Decoder::new(env_str("ETHERSCAN_API_KEY"));
    state.simulator = Simulator::new(tenderly);
    state.rate_limiter = RateLimiter::new(RateLimitConfig {
        requests_per_window: env_u32("RATE_LIMIT_REQUESTS_PER_WINDOW", 120),
        window_secs: env_u64("RATE_LIMIT_WINDOW_SECS", 60),
        max_clients: env_usize("RATE_LIMIT_MAX_CLIENTS", 10_000),
    });
    state.payments = PaymentsConfig {
        stripe_secret_key: env_str("STRIPE_SECRET_KEY"),
        stripe_price_id: env_str("STRIPE_PRICE_ID"),
        frontend_url: env_str("FRONTEND_URL")
            .unwrap_or_else(|| PaymentsConfig::default().frontend_url),
        daimo_webhook_token: env_str("DAIMO_WEBHOOK_TOKEN"),
    };
    tracing::info!(
        stripe_configured = state.payments.stripe_secret_key.is_some(),
        "payments initialized"
    );

    let app = api::router(state).layer(TraceLayer::new_for_http());

    let port = env_u64("PORT", 3001) as u16;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}

fn env_str(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}
