use actix_web::{http::StatusCode, test, web, App};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;

use chess_master::config::AppConfig;
use chess_master::game::{TimeControl, STANDARD_START_FEN};
use chess_master::models::{AppState, GameStatus, SavedGameRecord};
use chess_master::persistence::{MemoryStore, PersistenceStore};
use chess_master::routes::configure_routes;

fn record(name: &str, moves: &[&str], position: &str) -> SavedGameRecord {
    SavedGameRecord {
        id: None,
        name: name.to_string(),
        created_at: Utc::now(),
        saved_at: Utc::now(),
        autosave: false,
        start_position: STANDARD_START_FEN.to_string(),
        position_encoding: position.to_string(),
        moves: moves.iter().map(|m| m.to_string()).collect(),
        annotated_moves: Vec::new(),
        clock_config: TimeControl::default(),
        status: GameStatus::Playing,
        result: None,
    }
}

fn state() -> (web::Data<AppState>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let config = AppConfig {
        static_dir: PathBuf::from("./no-such-static-dir"),
        save_dir: None,
        engine_url: None,
        ..Default::default()
    };
    (
        web::Data::new(AppState::with_store(config, store.clone())),
        store,
    )
}

const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";

#[actix_web::test]
async fn index_falls_back_without_static_files() {
    let (app_state, _) = state();
    let static_dir = app_state.config.static_dir.clone();
    let app = test::init_service(
        App::new()
            .app_data(app_state)
            .configure(|cfg| configure_routes(cfg, &static_dir)),
    )
    .await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = test::read_body(resp).await;
    assert!(String::from_utf8_lossy(&body).contains("Chess Master"));
}

#[actix_web::test]
async fn saved_games_can_be_listed_exported_and_deleted() {
    let (app_state, store) = state();
    let id = store.put(record("Opening", &["e4"], AFTER_E4)).await.unwrap();
    let static_dir = app_state.config.static_dir.clone();
    let app = test::init_service(
        App::new()
            .app_data(app_state)
            .configure(|cfg| configure_routes(cfg, &static_dir)),
    )
    .await;

    let listed: serde_json::Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/api/games").to_request(),
    )
    .await;
    assert_eq!(listed.as_array().map(Vec::len), Some(1));

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/api/games/{}/moves", id))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(test::read_body(resp).await, "1. e4");

    let resp = test::call_service(
        &app,
        test::TestRequest::delete()
            .uri(&format!("/api/games/{}", id))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/api/games/{}", id))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn corrupt_records_are_unprocessable() {
    let (app_state, store) = state();
    let id = store
        .put(record("Broken", &["e4"], STANDARD_START_FEN))
        .await
        .unwrap();
    let static_dir = app_state.config.static_dir.clone();
    let app = test::init_service(
        App::new()
            .app_data(app_state)
            .configure(|cfg| configure_routes(cfg, &static_dir)),
    )
    .await;

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/api/games/{}/moves", id))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
