use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

static PANIC_HOOK: OnceLock<()> = OnceLock::new();

pub fn init_panic_hook() {
    PANIC_HOOK.get_or_init(|| {
        console_error_panic_hook::set_once();
    });
}

fn filter(directive: &str) -> EnvFilter {
    EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber. A second call keeps the first subscriber.
#[cfg(target_arch = "wasm32")]
pub fn init_logging(directive: &str) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let wasm_layer = tracing_wasm::WASMLayer::new(
        tracing_wasm::WASMLayerConfigBuilder::new()
            .set_report_logs_in_timings(false)
            .build(),
    );
    let _ = tracing_subscriber::registry()
        .with(filter(directive))
        .with(wasm_layer)
        .try_init();
}

#[cfg(not(target_arch = "wasm32"))]
pub fn init_logging(directive: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(directive))
        .with_test_writer()
        .try_init();
}
