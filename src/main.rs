//! undock — clean, eject, and diagnose externally-mounted volumes.
//!
//! Thin binary entry point. All logic lives in the `undock-core` and
//! `undock-cli` crates.

fn main() -> anyhow::Result<()> {
    // Initialise structured logging. Tables go to stdout; the log stream
    // stays on stderr so the two never interleave.
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_writer(std::io::stderr)
        .init();

    undock_cli::run()
}
