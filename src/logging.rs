use tracing_subscriber::EnvFilter;

/// Default filter for a `-v` count: warnings only, then info, debug, trace.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "perf_designer=info,warn",
        2 => "perf_designer=debug,info",
        _ => "trace",
    }
}

/// Logs go to stderr so they never interleave with the results screen.
/// `RUST_LOG` wins over the verbosity flag when set.
pub fn init_tracing(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn verbosity_raises_level() {
        assert_eq!(default_directive(0), "warn");
        assert!(default_directive(1).contains("info"));
        assert!(default_directive(2).contains("debug"));
        assert_eq!(default_directive(9), "trace");
    }

    #[test]
    fn directives_parse() {
        for verbosity in 0..4 {
            assert!(EnvFilter::try_new(default_directive(verbosity)).is_ok());
        }
    }
}
