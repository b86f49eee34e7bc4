use actix::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use log::{debug, info, warn};
use std::time::Duration;
use uuid::Uuid;

use crate::game::{GameError, GameOrchestrator, SelectOutcome};
use crate::models::*;

/// How often the clock is advanced while a game runs
const CLOCK_TICK_INTERVAL: Duration = Duration::from_millis(200);

/// One browser tab playing one game
pub struct ChessWebSocket {
    pub id: String,
    pub app_state: web::Data<AppState>,
    pub game: GameOrchestrator,
}

impl ChessWebSocket {
    pub fn new(app_state: web::Data<AppState>) -> Self {
        let game = GameOrchestrator::new(
            app_state.new_engine(),
            app_state.store.clone(),
            app_state.orchestrator_options(),
        );
        Self {
            id: Uuid::new_v4().to_string(),
            app_state,
            game,
        }
    }

    fn send(ctx: &mut ws::WebsocketContext<Self>, message: &ServerMessage) {
        match serde_json::to_string(message) {
            Ok(text) => ctx.text(text),
            Err(e) => warn!("Error serializing message: {}", e),
        }
    }

    /// Push every published snapshot to the client
    fn forward_snapshots(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let mut updates = self.game.subscribe();
        let addr = ctx.address();
        actix::spawn(async move {
            while updates.changed().await.is_ok() {
                let snapshot = updates.borrow_and_update().clone();
                let text = match serde_json::to_string(&ServerMessage::snapshot(snapshot)) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Error serializing snapshot: {}", e);
                        continue;
                    }
                };
                if addr.try_send(ChessWebSocketMessage(text)).is_err() {
                    break;
                }
            }
        });
    }

    /// Run an async game operation and send its reply when it finishes
    fn reply_later<F>(&self, ctx: &mut ws::WebsocketContext<Self>, operation: F)
    where
        F: std::future::Future<Output = ServerMessage> + 'static,
    {
        let addr = ctx.address();
        actix::spawn(async move {
            let message = operation.await;
            match serde_json::to_string(&message) {
                Ok(text) => addr.do_send(ChessWebSocketMessage(text)),
                Err(e) => warn!("Error serializing reply: {}", e),
            }
        });
    }

    pub fn handle_message(&mut self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        debug!("Connection {} action {:?}", self.id, msg.action);
        let reply = match msg.action.as_str() {
            "state" => Ok(Some(ServerMessage::snapshot(self.game.snapshot()))),
            "select" => self.handle_select(&msg),
            "move" => self.handle_move(&msg),
            "promote" => required(&msg.promote_to, "promote_to")
                .and_then(|piece| self.game.confirm_promotion(piece).map_err(|e| e.to_string()))
                .map(|_| None),
            "cancel_promotion" => {
                self.game.cancel_promotion();
                Ok(None)
            }
            "undo" => {
                self.game.undo_move();
                Ok(None)
            }
            "reset" => {
                self.game.reset_game();
                Ok(None)
            }
            "engine_move" => {
                let game = self.game.clone();
                self.reply_later(ctx, async move {
                    match game.make_engine_move().await {
                        Ok(_) => ServerMessage::new("engine_moved"),
                        Err(err) => ServerMessage::error(err.to_string()),
                    }
                });
                Ok(None)
            }
            "set_mode" => self.handle_set_mode(&msg),
            "set_difficulty" => msg
                .skill_level
                .ok_or_else(|| missing("skill_level"))
                .map(|skill| {
                    self.game.set_difficulty(skill);
                    None
                }),
            "set_time_control" => match (msg.start_time_minutes, msg.increment_seconds) {
                (Some(minutes), increment) if minutes > 0 => {
                    self.game.set_time_control(minutes, increment.unwrap_or(0));
                    Ok(None)
                }
                _ => Err(missing("start_time_minutes")),
            },
            "toggle_clock" => {
                let enabled = msg
                    .enabled
                    .unwrap_or(!self.game.snapshot().settings.clock_enabled);
                self.game.set_clock_enabled(enabled);
                Ok(None)
            }
            "pause" => {
                self.game.pause_clock();
                Ok(None)
            }
            "resume" => {
                self.game.resume_clock();
                Ok(None)
            }
            "save" => {
                let game = self.game.clone();
                let name = msg
                    .name
                    .clone()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| format!("Game {}", chrono::Utc::now().format("%Y-%m-%d %H:%M")));
                self.reply_later(ctx, async move {
                    match game.save_as(&name).await {
                        Ok(id) => ServerMessage {
                            game_id: Some(id),
                            ..ServerMessage::new("saved")
                        },
                        Err(err) => ServerMessage::error(err.to_string()),
                    }
                });
                Ok(None)
            }
            "load" => required(&msg.game_id, "game_id").map(|id| {
                let game = self.game.clone();
                let id = id.to_string();
                self.reply_later(ctx, async move {
                    match game.load_saved(&id).await {
                        Ok(()) => ServerMessage {
                            game_id: Some(id),
                            ..ServerMessage::new("loaded")
                        },
                        Err(err) => ServerMessage::error(err.to_string()),
                    }
                });
                None
            }),
            "list" => {
                let game = self.game.clone();
                self.reply_later(ctx, async move { saved_games_message(&game).await });
                Ok(None)
            }
            "delete" => required(&msg.game_id, "game_id").map(|id| {
                let game = self.game.clone();
                let id = id.to_string();
                self.reply_later(ctx, async move {
                    match game.delete_saved(&id).await {
                        Ok(()) => saved_games_message(&game).await,
                        Err(err) => ServerMessage::error(err.to_string()),
                    }
                });
                None
            }),
            "export" => Ok(Some(ServerMessage {
                moves_text: Some(self.game.export_moves(msg.annotated.unwrap_or(false))),
                ..ServerMessage::new("moves")
            })),
            "import" => required(&msg.text, "text").and_then(|text| {
                self.game
                    .import_moves(text)
                    .map(|_| None)
                    .map_err(|e| e.to_string())
            }),
            "review_next" | "review_prev" => {
                let frame = if msg.action == "review_next" {
                    self.game.review_next_mistake()
                } else {
                    self.game.review_prev_mistake()
                };
                Ok(Some(match frame {
                    Some(frame) => ServerMessage {
                        review: Some(frame),
                        ..ServerMessage::new("review")
                    },
                    None => ServerMessage::error("no further mistakes to review"),
                }))
            }
            "preview" => msg.ply.ok_or_else(|| missing("ply")).and_then(|ply| {
                self.game
                    .preview(ply)
                    .map(|frame| {
                        Some(ServerMessage {
                            review: Some(frame),
                            ..ServerMessage::new("preview")
                        })
                    })
                    .ok_or_else(|| format!("no move at ply {}", ply))
            }),
            other => Err(format!("unknown action {:?}", other)),
        };

        match reply {
            Ok(Some(message)) => Self::send(ctx, &message),
            Ok(None) => {}
            Err(error) => Self::send(ctx, &ServerMessage::error(error)),
        }
    }

    fn handle_select(&mut self, msg: &ClientMessage) -> Result<Option<ServerMessage>, String> {
        let square = required(&msg.square, "square")?;
        match self.game.select_square(square) {
            Ok(SelectOutcome::AwaitingPromotion { from, to }) => {
                info!("Connection {} promoting on {}{}", self.id, from, to);
                Ok(None)
            }
            Ok(_) => Ok(None),
            Err(err) => Err(err.to_string()),
        }
    }

    fn handle_move(&mut self, msg: &ClientMessage) -> Result<Option<ServerMessage>, String> {
        let from = required(&msg.move_from, "move_from")?;
        let to = required(&msg.move_to, "move_to")?;
        self.game
            .make_move(from, to, msg.promote_to.as_deref())
            .map(|_| None)
            .map_err(|err: GameError| err.to_string())
    }

    fn handle_set_mode(&mut self, msg: &ClientMessage) -> Result<Option<ServerMessage>, String> {
        let mode = required(&msg.mode, "mode")?;
        let mode = parse_mode(mode, msg.bot_side.as_deref())?;
        self.game.set_game_mode(mode);
        Ok(None)
    }
}

async fn saved_games_message(game: &GameOrchestrator) -> ServerMessage {
    match game.list_saved().await {
        Ok(saved) => ServerMessage {
            saved_games: Some(saved),
            ..ServerMessage::new("saved_games")
        },
        Err(err) => ServerMessage::error(err.to_string()),
    }
}

fn missing(field: &str) -> String {
    format!("missing field {:?}", field)
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, String> {
    value.as_deref().ok_or_else(|| missing(field))
}

/// `friend`, or `bot` with the side the engine plays (black by default)
pub fn parse_mode(mode: &str, bot_side: Option<&str>) -> Result<GameMode, String> {
    match mode.trim().to_ascii_lowercase().as_str() {
        "friend" | "human" => Ok(GameMode::Friend),
        "bot" | "computer" => {
            let bot_side = match bot_side.map(|s| s.trim().to_ascii_lowercase()) {
                None => Side::Black,
                Some(side) if side == "black" => Side::Black,
                Some(side) if side == "white" => Side::White,
                Some(side) => return Err(format!("unknown side {:?}", side)),
            };
            Ok(GameMode::Bot { bot_side })
        }
        other => Err(format!("unknown mode {:?}", other)),
    }
}

impl Actor for ChessWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let addr = ctx.address();
        self.app_state
            .sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(self.id.clone(), addr);
        info!("WebSocket connection started: {}", self.id);
        info!("Total active sessions: {}", self.app_state.session_count());

        self.forward_snapshots(ctx);
        ctx.run_interval(CLOCK_TICK_INTERVAL, |act, _ctx| {
            act.game.tick_now();
        });
        Self::send(ctx, &ServerMessage::snapshot(self.game.snapshot()));
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        self.app_state
            .sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&self.id);
        info!("WebSocket connection closed: {}", self.id);
        info!("Total active sessions: {}", self.app_state.session_count());
        Running::Stop
    }
}

impl Handler<ChessWebSocketMessage> for ChessWebSocket {
    type Result = ();

    fn handle(&mut self, msg: ChessWebSocketMessage, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ChessWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Text(text)) => {
                match serde_json::from_str::<ClientMessage>(text.as_ref()) {
                    Ok(client_msg) => self.handle_message(client_msg, ctx),
                    Err(e) => {
                        warn!("Error parsing client message: {}", e);
                        Self::send(ctx, &ServerMessage::error(format!("Invalid message format: {}", e)));
                    }
                }
            }
            Ok(ws::Message::Binary(_)) => {
                warn!("Binary messages are not supported");
                Self::send(ctx, &ServerMessage::error("Binary messages are not supported"));
            }
            Ok(ws::Message::Close(reason)) => {
                info!("Connection closed: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            _ => {
                ctx.stop();
            }
        }
    }
}

/// WebSocket connection handler
pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let ws = ChessWebSocket::new(app_state);
    info!("New WebSocket connection {}", ws.id);
    ws::start(ws, &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::prelude::v1::test;

    #[test]
    fn modes_parse_with_default_bot_side() {
        assert_eq!(parse_mode("friend", None), Ok(GameMode::Friend));
        assert_eq!(
            parse_mode("Bot", None),
            Ok(GameMode::Bot {
                bot_side: Side::Black
            })
        );
        assert_eq!(
            parse_mode("bot", Some("white")),
            Ok(GameMode::Bot {
                bot_side: Side::White
            })
        );
        assert!(parse_mode("bot", Some("green")).is_err());
        assert!(parse_mode("solo", None).is_err());
    }

    #[test]
    fn client_messages_tolerate_missing_fields() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"action":"move","move_from":"e2","move_to":"e4"}"#).unwrap();
        assert_eq!(required(&msg.move_from, "move_from"), Ok("e2"));
        assert_eq!(
            required(&msg.promote_to, "promote_to"),
            Err("missing field \"promote_to\"".to_string())
        );
    }
}
