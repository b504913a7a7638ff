use slab_vault::config::Config;
use slab_vault::server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging; RUST_LOG only applies once verbose output is on
    let filter = if config.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter()))
    } else {
        EnvFilter::new(config.log_filter())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        backlog = config.backlog,
        mode = ?config.mode,
        "Starting slab-vault server"
    );

    let mut server = Server::bind(&config)?;
    server.run()?;
    Ok(())
}
