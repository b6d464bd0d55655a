use tracing_subscriber::EnvFilter;

/// Log to stderr. `RUST_LOG` wins; otherwise warnings only, or debug output
/// from calrules crates with `--verbose`.
pub fn init(verbose: bool) {
    let default = if verbose {
        "warn,calrules_core=debug,calrules_cli=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
