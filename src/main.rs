mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use tunebox::config::Config;
use tunebox::observability::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server(args) => {
            let config = Config::load()?;
            tunebox::api::run(config, args.address).await?
        }
        Commands::CheckConfig => {
            let config = Config::load()?;
            println!("configuration ok");
            println!("  endpoint:     {}", config.platform.endpoint);
            println!("  container:    {}", config.platform.container_id);
            println!("  workers:      {}", config.credentials.len());
            println!("  chunk size:   {}", config.platform.chunk_size);
            println!("  bind address: {}", config.server.bind_addr);
        }
    }

    Ok(())
}
