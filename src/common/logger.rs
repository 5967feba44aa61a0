use tracing_subscriber::EnvFilter;

/// Map CLI verbosity onto a tracing filter. `RUST_LOG` always wins.
pub fn init(quiet: bool, verbose: bool) {
    let default_level = if quiet {
        "error"
    } else if verbose {
        "ytdlpp=debug,info"
    } else {
        "ytdlpp=info,warn"
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
