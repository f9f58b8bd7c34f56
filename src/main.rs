use std::sync::Arc;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};

mod api;
mod audit;
mod auth;
mod config;
mod db;
mod docs;
mod engine;
mod error;
mod model;
mod models;
mod routes;
mod store;
mod utils;

use config::Config;
use db::{init_db, run_migrations};

use crate::audit::{AuditSink, MySqlAuditSink};
use crate::docs::ApiDoc;
use crate::engine::clock::{Clock, SystemClock};
use crate::store::{AccountStore, DirectoryStore, EventStore, mysql::MySqlStore};
use crate::utils::{email_filter, policy_cache::PolicyCache};
use tracing::{error, info};
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "timeclock up"
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    // Rolling daily log
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(config.log_level)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!(zone = config.report_zone.name(), "Server starting...");

    let pool = init_db(&config.database_url).await.map_err(|e| {
        error!(error = %e, "Failed to connect to database");
        std::io::Error::other(e)
    })?;

    if config.run_migrations {
        run_migrations(&pool).await.map_err(|e| {
            error!(error = %e, "Failed to apply migrations");
            std::io::Error::other(e)
        })?;
    }

    let pool_for_filter_warmup = pool.clone();
    actix_web::rt::spawn(async move {
        if let Err(e) = email_filter::warmup_email_filter(&pool_for_filter_warmup, 500).await {
            error!(error = %e, "Failed to warm up email filter");
        }
    });

    let mysql = Arc::new(MySqlStore::new(pool.clone()));
    let store: Arc<dyn EventStore> = mysql.clone();
    let directory: Arc<dyn DirectoryStore> = mysql.clone();
    let accounts: Arc<dyn AccountStore> = mysql;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let audit_sink: Arc<dyn AuditSink> = Arc::new(MySqlAuditSink::new(pool));
    let store = Data::from(store);
    let directory = Data::from(directory);
    let accounts = Data::from(accounts);
    let clock = Data::from(clock);
    let audit_sink = Data::from(audit_sink);
    let policies = Data::new(PolicyCache::default());
    let zone = Data::new(config.report_zone);

    let server_addr = config.server_addr.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::new(config.clone()))
            .app_data(store.clone())
            .app_data(directory.clone())
            .app_data(accounts.clone())
            .app_data(clock.clone())
            .app_data(audit_sink.clone())
            .app_data(policies.clone())
            .app_data(zone.clone())
            .service(index)
            // Configure auth + protected routes with rate limiting
            .configure(|cfg| routes::configure(cfg, config.clone()))
    })
    .bind(server_addr)?
    .run()
    .await
}
