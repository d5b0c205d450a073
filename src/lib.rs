pub mod api;
pub mod auth;
pub mod chain;
pub mod decode;
pub mod domain;
pub mod explain;
pub mod observability;
pub mod policy;
pub mod registry;
pub mod risk;
pub mod safe;
pub mod safety;
pub mod simulate;
pub mod store;
pub mod util;
pub mod validate;

/// Stripe and checkout settings, all optional. Missing keys degrade
/// the Stripe routes to a 503 that points at the ETH payment flow.
#[derive(Clone, Debug)]
pub struct PaymentsConfig {
    pub stripe_secret_key: Option<String>,
    pub stripe_price_id: Option<String>,
    pub frontend_url: String,
    /// When set, Daimo webhook calls must carry this token in their
    /// Basic auth header.
    pub daimo_webhook_token: Option<String>,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            stripe_secret_key: None,
            stripe_price_id: None,
            frontend_url: "https://safewatch.dev".to_string(),
            daimo_webhook_token: None,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: store::Store,
    pub decoder: decode::Decoder,
    pub simulator: simulate::Simulator,
    pub safe: safe::SafeClient,
    pub auth: auth::AuthService,
    pub rate_limiter: safety::RateLimiter,
    pub metrics: observability::MetricsRegistry,
    pub payments: PaymentsConfig,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(store: store::Store, auth: auth::AuthService) -> Self {
        Self {
            store,
            decoder: decode::Decoder::new(None),
            simulator: simulate::Simulator::new(None),
            safe: safe::SafeClient::new(),
            auth,
            rate_limiter: safety::RateLimiter::new(safety::RateLimitConfig::default()),
            metrics: observability::MetricsRegistry::new(),
            payments: PaymentsConfig::default(),
            http: reqwest::Client::new(),
        }
    }
}
