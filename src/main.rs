use anyhow::Context;
use clap::Parser;

use chatgate::api::default_routes;
use chatgate::transport::serve;
use chatgate::{util, Dispatcher, GatewayConfig, RouteTable};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let env_source = util::load_env_files();
    let config = GatewayConfig::parse();
    util::init_tracing(config.debug);
    tracing::info!("Environment loaded from: {}", env_source);

    let public_dir = std::env::var("PUBLIC_DIR").unwrap_or_else(|_| "public".into());
    let groups = default_routes(public_dir);
    let table = if config.strict_routes {
        RouteTable::build_strict(groups, &config.url_prefix).context("building route table")?
    } else {
        RouteTable::build(groups, &config.url_prefix)
    };

    let dispatcher = Dispatcher::new(table, config.dispatch_settings());
    serve(config.transport, config.bind_addrs(), dispatcher)
        .await
        .with_context(|| format!("serving on port {}", config.port))?;
    tracing::info!("Chatgate stopped");
    Ok(())
}
