use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Env;

/// init
///
/// Installs the global tracing subscriber. `RUST_LOG` takes priority over the defaults.
/// Local runs get pretty, human-readable output; production emits JSON for log aggregators.
pub fn init(env: &Env) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "clinic_security=debug,tower_http=info,axum=trace".into());

    match env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }
}
