use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs JSON tracing on stderr, filtered by `RUST_LOG` (default `info`).
///
/// Stdout stays reserved for the one-line run summary.
pub fn init_tracing() -> anyhow::Result<()> {
    // 讀取 RUST_LOG，未設定時預設為 info
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .flatten_event(true)
        .with_current_span(true) // 帶上 sync_run span 的 run_id
        .with_writer(std::io::stderr); // stdout 只留給摘要行

    Registry::default()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
