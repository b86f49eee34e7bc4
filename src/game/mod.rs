pub mod clock;
pub mod error;
pub mod material;
pub mod notation;
pub mod orchestrator;
pub mod quality;
pub mod review;
pub mod rules;
pub mod session;

pub use clock::{ChessClock, ClockPhase, ClockView, TimeControl, TimeControlPreset, TimeoutEvent};
pub use error::{GameError, GameResult};
pub use orchestrator::{
    GameOrchestrator, MoveOutcome, MoveReport, OrchestratorOptions, SelectOutcome,
};
pub use quality::{classify, MoveQuality, MATE_SCORE_CP};
pub use review::ReviewFrame;
pub use rules::{IllegalReason, Position, STANDARD_START_FEN};
pub use session::GameSession;
