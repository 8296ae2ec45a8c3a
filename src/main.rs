mod auth;
mod booking;
mod catalog;
mod config;
mod db;
mod error;
mod identity;
mod management;
mod models;
mod registration;
mod routes;
mod state;
mod store;
mod templates;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use actix_files::Files;
use actix_web::{middleware, web, App, HttpServer};

use crate::{
    config::AppConfig,
    identity::SqliteIdentityProvider,
    state::AppState,
    store::SqliteDocumentStore,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(err) = run().await {
        eprintln!("Startup error: {err}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .init();

    let config = AppConfig::from_env();
    db::ensure_sqlite_dir(&config.database_url)?;

    let pool = db::connect(&config.database_url).await?;
    db::run_migrations(&pool).await?;

    let store = Arc::new(SqliteDocumentStore::new(pool.clone()).await?);
    let identities = Arc::new(SqliteIdentityProvider::new(pool));
    db::seed_admin(store.as_ref(), identities.as_ref(), &config.admin).await?;

    let state = AppState::new(store, identities).with_screen_idle(config.screen_idle);

    let address = config.bind_address();
    log::info!("Starting spa booking on http://{address}");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(middleware::Logger::default())
            .service(Files::new("/static", "./static").prefer_utf8(true))
            .configure(routes::public::configure)
            .configure(routes::admin::configure)
            .configure(routes::customer::configure)
    })
    .bind(address)?
    .run()
    .await?;

    Ok(())
}
