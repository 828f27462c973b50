//! CLI subcommand implementations for the magpie binary.

pub mod convert_cmd;
pub mod doctor;
pub mod scrape_cmd;

/// Initialize tracing. `MAGPIE_VERBOSE` and `MAGPIE_QUIET` pick the
/// default level; `RUST_LOG` still overrides everything.
pub fn init_tracing() {
    let default_directive = if std::env::var("MAGPIE_QUIET").is_ok() {
        "magpie=warn"
    } else if std::env::var("MAGPIE_VERBOSE").is_ok() {
        "magpie=debug"
    } else {
        "magpie=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(default_directive.parse().unwrap()),
        )
        .init();
}
