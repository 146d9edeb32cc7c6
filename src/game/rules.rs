use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::{
    ledger::apply_placement,
    state::{
        Board, GameEvent, GameState, GameStatus, IntegrityError, Line, Variant, WinningLine,
        BOARD_SIZE,
    },
};

/// 固定扫描顺序：三行、三列、两条对角线。
pub const WIN_LINES: [Line; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// 按固定顺序扫描，返回第一条三子相同且非空的连线。
pub fn detect_winner(board: &Board) -> Option<WinningLine> {
    WIN_LINES.iter().find_map(|&line| {
        let [a, b, c] = line;
        let mark = board.cells[a]?;
        (board.cells[b] == Some(mark) && board.cells[c] == Some(mark))
            .then_some(WinningLine { winner: mark, line })
    })
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, derive_more::Display, derive_more::Error,
)]
#[serde(tag = "type")]
pub enum MoveRejection {
    #[display("cell {index} is outside the board")]
    OutOfRange { index: usize },
    #[display("cell {index} is already occupied")]
    CellOccupied { index: usize },
    #[display("the game is already over")]
    GameFinished,
    #[display("the computer is still thinking")]
    ComputerThinking,
    #[display("the scheduled computer move was cancelled")]
    StaleComputerMove,
}

/// 一步棋的结算结果：落子后的状态与本步产生的事件。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleResolution {
    pub state: GameState,
    pub events: Vec<GameEvent>,
    pub status: GameStatus,
}

impl RuleResolution {
    pub fn new(state: GameState, events: Vec<GameEvent>) -> Self {
        let status = state.status;
        Self {
            state,
            events,
            status,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RuleEngine;

impl RuleEngine {
    pub fn new() -> Self {
        Self
    }

    fn ensure_playable(state: &GameState, index: usize) -> Result<(), MoveRejection> {
        if state.is_finished() {
            return Err(MoveRejection::GameFinished);
        }
        if index >= BOARD_SIZE {
            return Err(MoveRejection::OutOfRange { index });
        }
        if !state.board.is_empty_at(index) {
            return Err(MoveRejection::CellOccupied { index });
        }
        Ok(())
    }

    /// 当前执子方在 `index` 落子，并结算渐隐、胜负与换手。
    #[instrument(skip(self, state), fields(mover = %state.current_player, variant = ?state.variant))]
    pub fn place_mark(
        &mut self,
        state: &mut GameState,
        index: usize,
    ) -> Result<Vec<GameEvent>, MoveRejection> {
        Self::ensure_playable(state, index)?;

        let mover = state.current_player;
        let mut events = vec![GameEvent::MarkPlaced { mark: mover, index }];

        let variant = state.variant;
        if let Some(faded) = apply_placement(&mut state.board, &mut state.ledger, mover, index, variant) {
            events.push(GameEvent::MarkFaded {
                mark: mover,
                index: faded,
            });
        }
        state.move_count += 1;

        if let Some(WinningLine { winner, line }) = detect_winner(&state.board) {
            state.status = GameStatus::Won { winner, line };
            events.push(GameEvent::GameWon { winner, line });
        } else if variant == Variant::Classic && state.board.is_full() {
            state.status = GameStatus::Draw;
            events.push(GameEvent::GameDrawn);
        } else {
            state.current_player = mover.opponent();
            events.push(GameEvent::TurnPassed {
                next: state.current_player,
            });
        }

        for event in &events {
            state.record_event(event.clone());
        }
        debug!(index, status = ?state.status, "move accepted");
        Ok(events)
    }

    /// 同 `place_mark`，并附带落子后的状态副本。
    pub fn resolve(
        &mut self,
        state: &mut GameState,
        index: usize,
    ) -> Result<RuleResolution, MoveRejection> {
        let events = self.place_mark(state, index)?;
        Ok(RuleResolution::new(state.clone(), events))
    }
}

/// 提交一步棋；非法输入时原样返回旧状态。
pub fn submit_move(state: &GameState, index: usize) -> GameState {
    let mut next = state.clone();
    match RuleEngine::new().place_mark(&mut next, index) {
        Ok(_) => next,
        Err(rejection) => {
            warn!(index, %rejection, "move rejected");
            state.clone()
        }
    }
}

/// 先校验外部传入的状态，再提交。损坏的状态不会被落子。
pub fn submit_checked_move(state: &GameState, index: usize) -> Result<GameState, IntegrityError> {
    state.integrity_check()?;
    Ok(submit_move(state, index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{GameMode, Mark};

    fn play(variant: Variant, moves: &[usize]) -> GameState {
        let mut state = GameState::new(variant, GameMode::TwoPlayer);
        let mut engine = RuleEngine::new();
        for &index in moves {
            engine
                .place_mark(&mut state, index)
                .expect("scripted move should be legal");
        }
        state
    }

    fn board_of(cells: &str) -> Board {
        let mut board = Board::new();
        for (index, ch) in cells.chars().enumerate() {
            match ch {
                'X' => {
                    board.place(index, Mark::X);
                }
                'O' => {
                    board.place(index, Mark::O);
                }
                _ => {}
            }
        }
        board
    }

    #[test]
    fn detect_reports_every_single_line() {
        for line in WIN_LINES {
            for mark in [Mark::X, Mark::O] {
                let mut board = Board::new();
                for index in line {
                    board.place(index, mark);
                }
                assert_eq!(
                    detect_winner(&board),
                    Some(WinningLine { winner: mark, line })
                );
            }
        }
    }

    #[test]
    fn detect_ignores_mixed_and_partial_lines() {
        assert_eq!(detect_winner(&Board::new()), None);
        assert_eq!(detect_winner(&board_of("XXO......")), None);
        assert_eq!(detect_winner(&board_of("XX.OO....")), None);
        assert_eq!(detect_winner(&board_of("XOXXOOOXX")), None);
    }

    #[test]
    fn detect_prefers_first_line_in_scan_order() {
        // 行 [0,1,2] 与列 [0,3,6] 同时成立时取先扫描到的行
        let board = board_of("XXXX..X..");
        assert_eq!(
            detect_winner(&board),
            Some(WinningLine {
                winner: Mark::X,
                line: [0, 1, 2]
            })
        );
        let board = board_of("O...O.OOO");
        assert_eq!(detect_winner(&board).map(|w| w.line), Some([6, 7, 8]));
    }

    #[test]
    fn classic_top_row_win_ends_game() {
        let state = play(Variant::Classic, &[0, 3, 1, 4, 2]);
        assert_eq!(state.board, board_of("XXXOO...."));
        assert_eq!(state.winner(), Some(Mark::X));
        assert_eq!(state.winning_line(), Some([0, 1, 2]));
        assert!(state.is_finished());
        assert_eq!(state.to_move(), None);
        assert!(state.integrity_check().is_ok());
    }

    #[test]
    fn classic_full_board_without_line_is_draw() {
        let state = play(Variant::Classic, &[0, 1, 2, 4, 3, 5, 7, 6, 8]);
        assert_eq!(state.board, board_of("XOXXOOOXX"));
        assert!(state.is_draw());
        assert!(state.is_finished());
        assert_eq!(state.winner(), None);
        assert_eq!(state.event_log.last(), Some(&GameEvent::GameDrawn));
    }

    #[test]
    fn fading_fourth_move_clears_oldest_cell() {
        let state = play(Variant::Fading, &[0, 1, 5, 3, 7, 4, 6]);
        assert_eq!(state.board.get(0), None);
        assert_eq!(state.ledger.cells(Mark::X), &[5, 7, 6]);
        assert_eq!(state.current_player, Mark::O);
        assert!(state
            .event_log
            .contains(&GameEvent::MarkFaded { mark: Mark::X, index: 0 }));
        assert!(state.integrity_check().is_ok());
    }

    #[test]
    fn fading_hint_points_at_movers_oldest_piece() {
        let state = play(Variant::Fading, &[0, 1, 5, 3, 7]);
        // O 只有两枚棋子，不会渐隐
        assert_eq!(state.fading_cell(), None);
        let state = play(Variant::Fading, &[0, 1, 5, 3, 7, 4]);
        assert_eq!(state.fading_cell(), Some(0));
    }

    #[test]
    fn submit_move_rejections_leave_state_untouched() {
        let state = play(Variant::Classic, &[4]);
        assert_eq!(submit_move(&state, 4), state);
        assert_eq!(submit_move(&state, 9), state);
        assert_eq!(submit_move(&state, usize::MAX), state);

        let finished = play(Variant::Classic, &[0, 3, 1, 4, 2]);
        assert_eq!(submit_move(&finished, 8), finished);

        let mut engine = RuleEngine::new();
        let mut copy = finished.clone();
        assert_eq!(
            engine.place_mark(&mut copy, 8),
            Err(MoveRejection::GameFinished)
        );
    }

    #[test]
    fn submit_move_accepts_legal_move() {
        let state = GameState::new(Variant::Fading, GameMode::VersusComputer);
        let next = submit_move(&state, 8);
        assert_eq!(next.board.get(8), Some(Mark::X));
        assert_eq!(next.current_player, Mark::O);
        assert_eq!(next.move_count, 1);
    }

    #[test]
    fn resolve_reports_events_of_the_move_only() {
        let mut state = play(Variant::Fading, &[0, 1, 5, 3, 7, 4]);
        let resolution = RuleEngine::new()
            .resolve(&mut state, 6)
            .expect("empty cell should be playable");
        assert_eq!(
            resolution.events,
            vec![
                GameEvent::MarkPlaced { mark: Mark::X, index: 6 },
                GameEvent::MarkFaded { mark: Mark::X, index: 0 },
                GameEvent::TurnPassed { next: Mark::O },
            ]
        );
        assert_eq!(resolution.state, state);
        assert_eq!(resolution.status, GameStatus::InProgress);
    }

    #[test]
    fn checked_submit_refuses_corrupted_ledger() {
        // X 的记录里混入了棋盘外的下标 9
        let mut state = play(Variant::Fading, &[0, 3, 1, 4]);
        state.ledger.x = vec![9, 0, 1];
        assert_eq!(
            submit_checked_move(&state, 5),
            Err(IntegrityError::InvalidLedgerEntry {
                mark: Mark::X,
                index: 9,
            })
        );

        let mut repeated = play(Variant::Classic, &[4]);
        repeated.ledger.o = vec![4];
        assert!(submit_checked_move(&repeated, 0).is_err());

        let valid = play(Variant::Fading, &[0, 3, 1, 4]);
        let next = submit_checked_move(&valid, 5).expect("valid state should accept the move");
        assert_eq!(next.board.get(5), Some(Mark::X));
    }
}
