#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::sync::Arc;

use rendezvous_server::config::Config;
use rendezvous_server::logger::FileLogger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(Config::load()?);
    FileLogger::open(&config.log.path, config.log.level.as_level_filter())?.install()?;

    rendezvous_server::startup(config).await
}
