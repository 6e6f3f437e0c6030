use crate::configuration::{Settings, StoreBackend};
use crate::connectors::{CompletionService, OpenAiCompletionClient, StationSource, WaqiClient};
use crate::db::{self, MemoryStore, PgStore, Store};
use crate::helpers::JsonResponse;
use crate::routes;
use crate::services::{ChatRelay, ReadingService};
use actix_cors::Cors;
use actix_web::{dev::Server, error, web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;
use tracing_actix_web::TracingLogger;

fn io_error(err: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, err.to_string())
}

/// Opens the configured store and seeds it when asked to.
pub async fn build_store(settings: &Settings) -> Result<Arc<dyn Store>, std::io::Error> {
    let store: Arc<dyn Store> = match settings.store.backend {
        StoreBackend::Postgres => {
            tracing::info!(
                db_host = %settings.database.host,
                db_port = settings.database.port,
                db_name = %settings.database.database_name,
                "Connecting to PostgreSQL"
            );
            Arc::new(PgStore::connect(&settings.database).await.map_err(io_error)?)
        }
        StoreBackend::Memory => {
            tracing::info!("Using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    if settings.store.seed_on_startup {
        let created = db::seed::seed_if_empty(store.as_ref())
            .await
            .map_err(io_error)?;
        if created > 0 {
            tracing::info!(created, "Seeded reference readings");
        }
    }

    Ok(store)
}

pub async fn run(
    listener: TcpListener,
    store: Arc<dyn Store>,
    settings: Settings,
) -> Result<Server, std::io::Error> {
    let station_source: Arc<dyn StationSource> =
        Arc::new(WaqiClient::new(&settings.upstream).map_err(io_error)?);
    let completion: Arc<dyn CompletionService> =
        Arc::new(OpenAiCompletionClient::new(&settings.completion).map_err(io_error)?);

    let reading_service = web::Data::new(ReadingService::new(
        station_source,
        store.clone(),
        &settings.upstream,
    ));
    let chat_relay = web::Data::new(ChatRelay::new(
        store.clone(),
        completion,
        settings.completion.system_prompt.clone(),
    ));
    let store = web::Data::new(store);

    let json_config = web::JsonConfig::default().error_handler(|err, _req| {
        let msg = match &err {
            error::JsonPayloadError::Deserialize(err) => format!(
                "Invalid JSON at line {}, column {}: {}",
                err.line(),
                err.column(),
                err
            ),
            err => err.to_string(),
        };
        JsonResponse::bad_request(&msg)
    });

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .wrap(Cors::permissive())
            .service(web::scope("/health_check").service(routes::health_check))
            .service(
                web::scope("/readings")
                    .service(routes::readings::get::list)
                    .service(routes::readings::get::item),
            )
            .service(
                web::scope("/conversations")
                    .service(routes::conversations::get::list)
                    .service(routes::conversations::get::item)
                    .service(routes::conversations::add::item)
                    .service(routes::conversations::delete::item)
                    .service(routes::conversations::messages::send),
            )
            .app_data(json_config.clone())
            .app_data(store.clone())
            .app_data(reading_service.clone())
            .app_data(chat_relay.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
