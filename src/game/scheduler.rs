use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{
    rules::{MoveRejection, RuleEngine, RuleResolution},
    state::{Board, GameMode, GameState, Line, Mark, Variant},
};
use crate::ai::{AiAgent, AiConfig, AiDecision};

/// 电脑“思考”的默认时长（毫秒）。
pub const DEFAULT_THINKING_DELAY_MS: u32 = 600;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SchedulerPhase {
    WaitingForHuman,
    ComputerThinking,
    GameOver,
}

/// 一次待执行的电脑落子凭据，重置后即失效。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThinkingTicket {
    pub generation: u64,
    pub delay_ms: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub thinking_delay_ms: u32,
    pub computer: Mark,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            thinking_delay_ms: DEFAULT_THINKING_DELAY_MS,
            computer: Mark::O,
        }
    }
}

/// 电脑落子的结果：搜索结论与实际结算。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AiMoveResponse {
    pub decision: AiDecision,
    pub applied: RuleResolution,
}

/// 提供给界面层的状态快照。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameSnapshot {
    pub board: Board,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_move: Option<Mark>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<Mark>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winning_line: Option<Line>,
    pub finished: bool,
    pub draw: bool,
    pub thinking: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fading_cell: Option<usize>,
    pub variant: Variant,
    pub mode: GameMode,
    pub move_count: u32,
}

/// 回合调度：人类落子 → 电脑思考 → 电脑落子。
#[derive(Debug, Clone)]
pub struct TurnScheduler {
    state: GameState,
    phase: SchedulerPhase,
    generation: u64,
    pending: Option<ThinkingTicket>,
    config: SchedulerConfig,
}

impl TurnScheduler {
    pub fn new(variant: Variant, mode: GameMode) -> Self {
        Self::with_config(variant, mode, SchedulerConfig::default())
    }

    /// 电脑执先手时，新建后即处于思考状态，凭据可由 `pending` 取得。
    pub fn with_config(variant: Variant, mode: GameMode, config: SchedulerConfig) -> Self {
        let mut scheduler = Self {
            state: GameState::new(variant, mode),
            phase: SchedulerPhase::WaitingForHuman,
            generation: 0,
            pending: None,
            config,
        };
        scheduler.schedule_if_computer_turn();
        scheduler
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    pub fn is_thinking(&self) -> bool {
        self.phase == SchedulerPhase::ComputerThinking
    }

    pub fn pending(&self) -> Option<ThinkingTicket> {
        self.pending
    }

    fn computer_to_move(&self) -> bool {
        self.state.mode == GameMode::VersusComputer
            && self.state.to_move() == Some(self.config.computer)
    }

    fn schedule_if_computer_turn(&mut self) -> Option<ThinkingTicket> {
        if !self.computer_to_move() {
            return None;
        }
        let ticket = ThinkingTicket {
            generation: self.generation,
            delay_ms: self.config.thinking_delay_ms,
        };
        self.pending = Some(ticket);
        self.phase = SchedulerPhase::ComputerThinking;
        debug!(generation = ticket.generation, "computer is thinking");
        Some(ticket)
    }

    pub fn snapshot(&self) -> GameSnapshot {
        let state = &self.state;
        GameSnapshot {
            board: state.board,
            to_move: state.to_move(),
            winner: state.winner(),
            winning_line: state.winning_line(),
            finished: state.is_finished(),
            draw: state.is_draw(),
            thinking: self.is_thinking(),
            fading_cell: state.fading_cell(),
            variant: state.variant,
            mode: state.mode,
            move_count: state.move_count,
        }
    }

    /// 人类选择一个格子；如果轮到电脑，返回思考凭据。
    pub fn choose_cell(&mut self, index: usize) -> Result<Option<ThinkingTicket>, MoveRejection> {
        if self.is_thinking() || self.computer_to_move() {
            warn!(index, "cell chosen while the computer is thinking");
            return Err(MoveRejection::ComputerThinking);
        }

        RuleEngine::new().place_mark(&mut self.state, index)?;

        if self.state.is_finished() {
            self.phase = SchedulerPhase::GameOver;
            return Ok(None);
        }

        Ok(self.schedule_if_computer_turn())
    }

    /// 计时结束后兑现凭据：搜索并落子。过期凭据不会改动状态。
    pub fn complete_computer_move(
        &mut self,
        ticket: ThinkingTicket,
    ) -> Result<AiMoveResponse, MoveRejection> {
        if self.pending != Some(ticket) || ticket.generation != self.generation {
            warn!(
                ticket = ticket.generation,
                current = self.generation,
                "discarding stale computer move"
            );
            return Err(MoveRejection::StaleComputerMove);
        }
        self.pending = None;

        let agent = AiAgent::new(AiConfig::for_variant(self.state.variant));
        let decision = agent.decide_move(&self.state);

        let applied = match decision.cell {
            Some(cell) => RuleEngine::new().resolve(&mut self.state, cell),
            None => Err(MoveRejection::GameFinished),
        };

        self.phase = if self.state.is_finished() {
            SchedulerPhase::GameOver
        } else {
            SchedulerPhase::WaitingForHuman
        };

        applied.map(|applied| AiMoveResponse { decision, applied })
    }

    /// 重新开局；作废所有未兑现的凭据。电脑先手时返回新的思考凭据。
    pub fn reset(&mut self, variant: Option<Variant>) -> Option<ThinkingTicket> {
        let variant = variant.unwrap_or(self.state.variant);
        let mode = self.state.mode;
        self.restart(variant, mode)
    }

    pub fn set_variant(&mut self, variant: Variant) -> Option<ThinkingTicket> {
        self.restart(variant, self.state.mode)
    }

    pub fn set_mode(&mut self, mode: GameMode) -> Option<ThinkingTicket> {
        self.restart(self.state.variant, mode)
    }

    fn restart(&mut self, variant: Variant, mode: GameMode) -> Option<ThinkingTicket> {
        self.generation += 1;
        if self.pending.take().is_some() {
            info!(generation = self.generation, "pending computer move cancelled");
        }
        self.state = GameState::new(variant, mode);
        self.phase = SchedulerPhase::WaitingForHuman;
        self.schedule_if_computer_turn()
    }
}
