use serde::{Deserialize, Serialize};

use super::state::{Board, Mark, Variant};

/// 每位玩家当前在盘面上的棋子，按落子先后排列（最旧在前）。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MoveLedger {
    #[serde(default)]
    pub x: Vec<usize>,
    #[serde(default)]
    pub o: Vec<usize>,
}

impl MoveLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cells(&self, mark: Mark) -> &[usize] {
        match mark {
            Mark::X => &self.x,
            Mark::O => &self.o,
        }
    }

    fn cells_mut(&mut self, mark: Mark) -> &mut Vec<usize> {
        match mark {
            Mark::X => &mut self.x,
            Mark::O => &mut self.o,
        }
    }

    pub fn len(&self, mark: Mark) -> usize {
        self.cells(mark).len()
    }

    pub fn oldest(&self, mark: Mark) -> Option<usize> {
        self.cells(mark).first().copied()
    }

    pub fn owner_of(&self, index: usize) -> Option<Mark> {
        [Mark::X, Mark::O]
            .into_iter()
            .find(|mark| self.cells(*mark).contains(&index))
    }

    /// 记录一次落子；渐隐规则下超出上限时移除并返回最旧的格子。
    ///
    /// 调用方负责确认格子为空且对局未结束。
    pub fn record(&mut self, mark: Mark, index: usize, variant: Variant) -> Option<usize> {
        let cells = self.cells_mut(mark);
        cells.push(index);
        match variant.piece_limit() {
            Some(limit) if cells.len() > limit => Some(cells.remove(0)),
            _ => None,
        }
    }

    /// 该玩家下一次落子会挤掉的格子。
    pub fn next_to_fade(&self, mark: Mark, variant: Variant) -> Option<usize> {
        let limit = variant.piece_limit()?;
        if self.len(mark) >= limit {
            self.oldest(mark)
        } else {
            None
        }
    }
}

/// 在棋盘与记录上同步落子，返回被挤掉的格子。
pub fn apply_placement(
    board: &mut Board,
    ledger: &mut MoveLedger,
    mark: Mark,
    index: usize,
    variant: Variant,
) -> Option<usize> {
    if !board.place(index, mark) {
        return None;
    }
    let evicted = ledger.record(mark, index, variant);
    if let Some(old) = evicted {
        board.clear(old);
    }
    evicted
}
