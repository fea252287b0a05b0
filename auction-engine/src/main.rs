use {
    anyhow::Result,
    clap::Parser,
    std::io::IsTerminal,
    tracing_subscriber::{
        filter::LevelFilter,
        layer::SubscriberExt,
        util::SubscriberInitExt,
        Layer,
    },
};

mod api;
mod auction;
mod config;
mod kernel;
mod metrics;
mod server;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize a Tracing Subscriber
    let log_layer = tracing_subscriber::fmt::layer()
        .with_file(false)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(true)
        .with_ansi(std::io::stderr().is_terminal());

    if std::io::stderr().is_terminal() {
        tracing_subscriber::registry()
            .with(log_layer.compact().with_filter(LevelFilter::INFO))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(log_layer.json().with_filter(LevelFilter::INFO))
            .init();
    }

    // Parse the command line arguments, will exit automatically on `--help`
    // or with invalid arguments.
    match config::Options::parse() {
        config::Options::Run(opts) => server::start_server(opts).await,
    }
}
