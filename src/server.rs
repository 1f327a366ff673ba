/// HTTP server: the WebSocket endpoint, a plain JSON RPC endpoint and a
/// health check, all backed by one shared store.
use actix_web::{middleware, web, App, Error, HttpRequest, HttpResponse, HttpServer};
use actix_web_actors::ws;

use crate::config::ServerConfig;
use crate::messages::{ClientMessage, ServerMessage};
use crate::table::Store;
use crate::websocket::{AppState, GridSocket};

/// WebSocket endpoint handler
async fn ws_index(req: HttpRequest, stream: web::Payload, state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    ws::start(GridSocket::new(state), &req, stream)
}

/// One call per request, same payloads as the WebSocket protocol
async fn rpc_index(msg: web::Json<ClientMessage>, state: web::Data<AppState>) -> HttpResponse {
    let ClientMessage { request_id, call } = msg.into_inner();
    let result = AppState::call_blocking(state, call).await;

    match result {
        Ok(Ok(reply)) => HttpResponse::Ok().json(ServerMessage::Reply { request_id, reply }),
        Ok(Err(e)) => HttpResponse::BadRequest().json(ServerMessage::Error {
            request_id: Some(request_id),
            message: e.to_string(),
        }),
        Err(e) => {
            log::error!("rpc worker failed: {}", e);
            HttpResponse::InternalServerError().json(ServerMessage::Error {
                request_id: Some(request_id),
                message: "internal error".to_string(),
            })
        }
    }
}

/// Health check endpoint
async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "message": "gridbase server is running"
    }))
}

/// Build the store the server starts with
pub fn initial_store(config: &ServerConfig) -> crate::error::Result<Store> {
    if !config.seed_demo {
        return Ok(Store::new());
    }
    let (store, table_id) = Store::with_demo_data()?;
    log::info!("seeded demo table {}", table_id);
    Ok(store)
}

/// Start the HTTP server
pub async fn run_server(config: ServerConfig, store: Store) -> std::io::Result<()> {
    let state = web::Data::new(AppState::new(store));

    log::info!("WebSocket: ws://{}:{}/ws", config.host, config.port);
    log::info!("RPC: http://{}:{}/rpc", config.host, config.port);
    log::info!("Health check: http://{}:{}/health", config.host, config.port);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            // CORS for development
            .wrap(
                actix_cors::Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .route("/ws", web::get().to(ws_index))
            .route("/rpc", web::post().to(rpc_index))
            .route("/health", web::get().to(health_check))
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};
    use uuid::Uuid;

    #[test]
    fn test_initial_store_respects_seed_flag() {
        let empty = initial_store(&ServerConfig {
            seed_demo: false,
            ..ServerConfig::default()
        })
        .unwrap();
        assert!(empty.list_bases().is_empty());

        let seeded = initial_store(&ServerConfig::default()).unwrap();
        assert_eq!(seeded.list_bases().len(), 1);
    }

    #[actix_web::test]
    async fn test_rpc_endpoint() {
        let (store, table_id) = Store::with_demo_data().unwrap();
        let state = web::Data::new(AppState::new(store));
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .route("/rpc", web::post().to(rpc_index))
                .route("/health", web::get().to(health_check)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/rpc")
            .set_json(serde_json::json!({
                "request_id": 1,
                "call": {"method": "count_rows", "params": {"table_id": table_id}}
            }))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["type"], "reply");
        assert_eq!(body["reply"]["data"], 503);

        let req = test::TestRequest::post()
            .uri("/rpc")
            .set_json(serde_json::json!({
                "request_id": 2,
                "call": {"method": "count_rows", "params": {"table_id": Uuid::new_v4()}}
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }
}
