use actix_web::{middleware, web, App, HttpServer};
use log::info;

use chess_master::config::AppConfig;
use chess_master::models::AppState;
use chess_master::routes::configure_routes;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::load();
    let bind_addr = config.bind_addr.clone();
    let static_dir = config.static_dir.clone();
    match &config.engine_url {
        Some(url) => info!("Using engine at {}", url),
        None => info!("Engine disabled, bot plays from the local fallback"),
    }

    let app_state = web::Data::new(AppState::new(config));

    info!("Starting chess server at http://{}", bind_addr);

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(app_state.clone())
            .configure(|cfg| configure_routes(cfg, &static_dir))
    })
    .bind(&bind_addr)?
    .run()
    .await?;
    Ok(())
}
