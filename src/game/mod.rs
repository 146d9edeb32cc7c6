//! 井字棋核心逻辑（棋盘状态、落子记录、规则与回合调度）。

pub mod ledger;
pub mod rules;
pub mod scheduler;
pub mod state;

pub use ledger::{apply_placement, MoveLedger};
pub use rules::{
    detect_winner, submit_checked_move, submit_move, MoveRejection, RuleEngine, RuleResolution,
    WIN_LINES,
};
pub use scheduler::{
    AiMoveResponse,
    GameSnapshot,
    SchedulerConfig,
    SchedulerPhase,
    ThinkingTicket,
    TurnScheduler,
    DEFAULT_THINKING_DELAY_MS,
};
pub use state::{
    Board,
    Cell,
    GameEvent,
    GameMode,
    GameState,
    GameStatus,
    IntegrityError,
    Line,
    Mark,
    Variant,
    WinningLine,
    BOARD_SIZE,
    FADING_PIECE_LIMIT,
};
