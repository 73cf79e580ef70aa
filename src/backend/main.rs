use cc_optimizer::api::{AppState, router};
use cc_optimizer::config::{DbArgs, ServerArgs, init_tracing};
use cc_optimizer::db;
use cc_optimizer::error::AppError;
use clap::Parser;
use tracing::info;

/// HTTP backend for the credit card rewards optimizer
#[derive(Parser)]
#[command(name = "cc-optimizer-backend", version, about)]
struct Args {
    #[command(flatten)]
    db: DbArgs,

    #[command(flatten)]
    server: ServerArgs,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let args = Args::parse();
    init_tracing("info");

    let conn = db::init_db(&args.db.db_path)?;
    let app = router(AppState::new(conn));

    let listener = tokio::net::TcpListener::bind(args.server.bind).await?;
    info!(addr = %args.server.bind, db = %args.db.db_path.display(), "backend listening");
    axum::serve(listener, app).await?;
    Ok(())
}
