use actix_files as fs;
use actix_web::{web, HttpResponse, Responder};
use log::warn;
use std::path::{Path, PathBuf};

use crate::game::notation::export_move_list;
use crate::game::orchestrator::restore_session;
use crate::models::AppState;
use crate::persistence::PersistenceError;

const FALLBACK_INDEX: &str = "<!doctype html><title>Chess Master</title>\
<p>Chess Master is running. Connect a client to <code>/ws</code>.</p>";

/// Where the static assets live, shared with the index handler
#[derive(Clone)]
struct StaticDir(PathBuf);

/// HTTP handler for the index page
async fn index(static_dir: web::Data<StaticDir>) -> HttpResponse {
    let page = static_dir.0.join("index.html");
    match tokio::fs::read_to_string(&page).await {
        Ok(html) => HttpResponse::Ok().content_type("text/html; charset=utf-8").body(html),
        Err(_) => HttpResponse::Ok()
            .content_type("text/html; charset=utf-8")
            .body(FALLBACK_INDEX),
    }
}

fn store_error(err: PersistenceError) -> HttpResponse {
    match err {
        PersistenceError::NotFound(id) => {
            HttpResponse::NotFound().json(serde_json::json!({ "error": format!("no saved game {}", id) }))
        }
        PersistenceError::InvalidId(id) => {
            HttpResponse::BadRequest().json(serde_json::json!({ "error": format!("invalid id {:?}", id) }))
        }
        other => {
            warn!("Saved game store failed: {}", other);
            HttpResponse::InternalServerError().json(serde_json::json!({ "error": other.to_string() }))
        }
    }
}

/// List saved games, newest first
async fn list_games(app_state: web::Data<AppState>) -> impl Responder {
    match app_state.store.list().await {
        Ok(saved) => HttpResponse::Ok().json(saved),
        Err(err) => store_error(err),
    }
}

async fn get_game(app_state: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    match app_state.store.get(&id).await {
        Ok(record) => HttpResponse::Ok().json(record),
        Err(err) => store_error(err),
    }
}

async fn delete_game(app_state: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    match app_state.store.delete(&id).await {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(err) => store_error(err),
    }
}

/// The annotated move list of a saved game as plain text
async fn game_moves(app_state: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    let record = match app_state.store.get(&id).await {
        Ok(record) => record,
        Err(err) => return store_error(err),
    };
    match restore_session(&record) {
        Ok(session) => {
            let outcome = session.outcome();
            let text = export_move_list(
                session.start(),
                session.annotations(),
                outcome.as_ref(),
                true,
            );
            HttpResponse::Ok().content_type("text/plain; charset=utf-8").body(text)
        }
        Err(err) => HttpResponse::UnprocessableEntity().json(serde_json::json!({ "error": err.to_string() })),
    }
}

/// Configure the HTTP routes
pub fn configure_routes(cfg: &mut web::ServiceConfig, static_dir: &Path) {
    cfg.app_data(web::Data::new(StaticDir(static_dir.to_path_buf())))
        .service(web::resource("/ws").route(web::get().to(crate::websocket::ws_index)))
        .service(web::resource("/api/games").route(web::get().to(list_games)))
        .service(
            web::resource("/api/games/{id}")
                .route(web::get().to(get_game))
                .route(web::delete().to(delete_game)),
        )
        .service(web::resource("/api/games/{id}/moves").route(web::get().to(game_moves)))
        .service(web::resource("/").route(web::get().to(index)))
        .service(fs::Files::new("/static", static_dir));
}
