use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ledger::MoveLedger;

/// 棋盘格子数量（3×3，按行展开）。
pub const BOARD_SIZE: usize = 9;
/// 渐隐规则下每方同时存在的棋子上限。
pub const FADING_PIECE_LIMIT: usize = 3;

/// 一条连线：三个格子下标。
pub type Line = [usize; 3];
/// 单个格子，`None` 表示空格。
pub type Cell = Option<Mark>;

/// 玩家标记。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Mark {
    X,
    O,
}

impl Mark {
    pub fn opponent(self) -> Self {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mark::X => write!(f, "X"),
            Mark::O => write!(f, "O"),
        }
    }
}

/// 规则变体：经典或渐隐。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Classic,
    #[default]
    Fading,
}

impl Variant {
    /// 每方棋子上限，经典规则不设上限。
    pub fn piece_limit(self) -> Option<usize> {
        match self {
            Variant::Classic => None,
            Variant::Fading => Some(FADING_PIECE_LIMIT),
        }
    }
}

impl FromStr for Variant {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "classic" | "standard" => Ok(Variant::Classic),
            "fading" | "fade" => Ok(Variant::Fading),
            _ => Err(()),
        }
    }
}

/// 对局模式：人机或双人同屏。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum GameMode {
    #[default]
    VersusComputer,
    TwoPlayer,
}

impl FromStr for GameMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "versus-computer" | "computer" | "ai" => Ok(GameMode::VersusComputer),
            "two-player" | "multiplayer" | "multi" => Ok(GameMode::TwoPlayer),
            _ => Err(()),
        }
    }
}

/// 3×3 棋盘。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct Board {
    pub cells: [Cell; BOARD_SIZE],
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cells(cells: [Cell; BOARD_SIZE]) -> Self {
        Self { cells }
    }

    pub fn get(&self, index: usize) -> Cell {
        self.cells.get(index).copied().flatten()
    }

    pub fn is_empty_at(&self, index: usize) -> bool {
        matches!(self.cells.get(index), Some(None))
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// 按下标升序返回所有空格。
    pub fn empty_cells(&self) -> impl Iterator<Item = usize> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.is_none())
            .map(|(index, _)| index)
    }

    /// 越界时不做任何修改并返回 `false`。
    pub fn place(&mut self, index: usize, mark: Mark) -> bool {
        match self.cells.get_mut(index) {
            Some(cell) => {
                *cell = Some(mark);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self, index: usize) -> bool {
        match self.cells.get_mut(index) {
            Some(cell) => {
                *cell = None;
                true
            }
            None => false,
        }
    }
}

/// 一条已完成的连线及其所属玩家。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WinningLine {
    pub winner: Mark,
    pub line: Line,
}

/// 对局状态。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "type")]
pub enum GameStatus {
    #[default]
    InProgress,
    Won {
        winner: Mark,
        line: Line,
    },
    Draw,
}

/// 游戏事件流。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameEvent {
    MarkPlaced { mark: Mark, index: usize },
    MarkFaded { mark: Mark, index: usize },
    TurnPassed { next: Mark },
    GameWon { winner: Mark, line: Line },
    GameDrawn,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[serde(tag = "type")]
pub enum IntegrityError {
    #[display("ledger entry {index} for {mark} is off the board or repeated")]
    InvalidLedgerEntry { mark: Mark, index: usize },
    #[display("cell {index} holds {found:?} but the ledger says {expected:?}")]
    LedgerMismatch {
        index: usize,
        expected: Option<Mark>,
        found: Option<Mark>,
    },
    #[display("{mark} holds {count} pieces, above the fading limit")]
    PieceLimitExceeded { mark: Mark, count: usize },
    #[display("status does not match the board")]
    StatusMismatch,
}

/// 游戏整体状态。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameState {
    pub board: Board,
    pub ledger: MoveLedger,
    pub current_player: Mark,
    #[serde(default)]
    pub status: GameStatus,
    pub variant: Variant,
    #[serde(default)]
    pub mode: GameMode,
    #[serde(default)]
    pub move_count: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_log: Vec<GameEvent>,
}

impl GameState {
    pub fn new(variant: Variant, mode: GameMode) -> Self {
        Self {
            board: Board::new(),
            ledger: MoveLedger::new(),
            current_player: Mark::X,
            status: GameStatus::InProgress,
            variant,
            mode,
            move_count: 0,
            event_log: Vec::new(),
        }
    }

    pub fn record_event(&mut self, event: GameEvent) {
        self.event_log.push(event);
    }

    pub fn is_finished(&self) -> bool {
        self.status != GameStatus::InProgress
    }

    pub fn is_draw(&self) -> bool {
        self.status == GameStatus::Draw
    }

    /// 当前执子方，对局结束后为 `None`。
    pub fn to_move(&self) -> Option<Mark> {
        (!self.is_finished()).then_some(self.current_player)
    }

    pub fn winner(&self) -> Option<Mark> {
        match self.status {
            GameStatus::Won { winner, .. } => Some(winner),
            _ => None,
        }
    }

    pub fn winning_line(&self) -> Option<Line> {
        match self.status {
            GameStatus::Won { line, .. } => Some(line),
            _ => None,
        }
    }

    /// 当前执子方下一手将会消失的棋子。
    pub fn fading_cell(&self) -> Option<usize> {
        let mover = self.to_move()?;
        self.ledger.next_to_fade(mover, self.variant)
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        let mut seen = [false; BOARD_SIZE];
        for mark in [Mark::X, Mark::O] {
            for &index in self.ledger.cells(mark) {
                match seen.get_mut(index) {
                    Some(slot) if !*slot => *slot = true,
                    _ => return Err(IntegrityError::InvalidLedgerEntry { mark, index }),
                }
            }
        }

        for index in 0..BOARD_SIZE {
            let expected = self.ledger.owner_of(index);
            let found = self.board.get(index);
            if expected != found {
                return Err(IntegrityError::LedgerMismatch {
                    index,
                    expected,
                    found,
                });
            }
        }

        if let Some(limit) = self.variant.piece_limit() {
            for mark in [Mark::X, Mark::O] {
                let count = self.ledger.len(mark);
                if count > limit {
                    return Err(IntegrityError::PieceLimitExceeded { mark, count });
                }
            }
        }

        let detected = super::rules::detect_winner(&self.board);
        let consistent = match self.status {
            GameStatus::Won { winner, line } => {
                detected == Some(WinningLine { winner, line })
            }
            GameStatus::Draw => detected.is_none() && self.board.is_full(),
            GameStatus::InProgress => detected.is_none(),
        };
        if !consistent {
            return Err(IntegrityError::StatusMismatch);
        }

        Ok(())
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new(Variant::default(), GameMode::default())
    }
}
