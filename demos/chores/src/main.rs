//! Chore tracker served with Daedalus.
//!
//! Configuration comes from `daedalus.toml` when present, then `DAEDALUS__*`
//! environment variables (a `.env` file is read first).
//!
//! ```bash
//! DAEDALUS__SERVER__ADDRESS=127.0.0.1:3000 cargo run -p chores
//! curl -X POST localhost:3000/chores -d '{"title":"sweep"}'
//! ```

mod routes;
mod store;

use std::sync::Arc;

use daedalus::prelude::*;
use tracing::info;

use crate::store::ChoreStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::new()
        .with_dotenv()?
        .with_optional_file("daedalus.toml")?
        .with_env_prefix("DAEDALUS")
        .load()?;

    init_logging(&config.logging)?;

    let store = ChoreStore::new();
    let router = Arc::new(routes::app_router(&store, config.router.router_options())?);

    let app = Application::with_options(config.server.application_options());
    app.use_middleware(RequestLogger::new().response_time(true));
    app.use_middleware(router.routes());
    app.use_middleware(router.allowed_methods(AllowedMethodsOptions::default()));

    let listen = config.server.listen_options()?;
    info!(address = %config.server.address, "starting chores");
    app.listen(listen, AbortSignal::with_os_signals()).await?;

    info!("chores stopped");
    Ok(())
}
