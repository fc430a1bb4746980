use enrichment::{
    config::{ServiceConfig, TransportRuntime},
    transport::{SkillRuntime, serve_http_with_workers},
};
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() {
    init_logging();

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(%err, "label skill configuration error");
            std::process::exit(2);
        }
    };

    let runtime = SkillRuntime::from_config(&config);
    let bind_addr = config.bind_addr.as_str();
    tracing::info!(
        skill = runtime.skill().name(),
        container = runtime.container().base_uri(),
        workers = config.http_workers,
        transport = config.transport_runtime.as_str(),
        function_key_required = config.function_key.is_some(),
        "label skill starting"
    );
    tracing::info!("label skill endpoint: http://{bind_addr}{}", runtime.skill_route());
    tracing::info!("label skill health endpoint: http://{bind_addr}/health");
    tracing::info!("label skill metrics endpoint: http://{bind_addr}/metrics");

    match config.transport_runtime {
        TransportRuntime::Std => {
            if let Err(err) = serve_http_with_workers(runtime, bind_addr, config.http_workers) {
                tracing::error!(%err, "label skill transport failed");
                std::process::exit(1);
            }
        }
        TransportRuntime::Axum => {
            #[cfg(feature = "async-transport")]
            {
                if let Err(err) = enrichment::transport_axum::serve_http_with_axum(
                    runtime,
                    bind_addr,
                    config.http_workers,
                ) {
                    tracing::error!(%err, "label skill transport failed");
                    std::process::exit(1);
                }
            }
            #[cfg(not(feature = "async-transport"))]
            {
                drop(runtime);
                tracing::error!(
                    "label skill transport runtime 'axum' requires build feature 'async-transport'"
                );
                std::process::exit(2);
            }
        }
    }
}
