/// Info level by default; `RUST_LOG` overrides it, e.g. `RUST_LOG=cmsbench=debug`.
pub fn setup_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_millis()
        .format_target(false)
        .init();
}
