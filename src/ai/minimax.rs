use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::game::{
    apply_placement, detect_winner, Board, GameState, IntegrityError, Mark, MoveLedger, Variant,
};

/// 渐隐规则下的默认搜索深度（层）。
pub const DEFAULT_FADING_DEPTH: u8 = 6;
const BOUNDED_WIN_SCORE: i32 = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SearchMode {
    /// 搜到终局为止，胜 +1 / 负 -1 / 平 0。
    Exhaustive,
    /// 限深搜索，越早获胜得分越高，未分胜负计 0。
    DepthBounded { max_depth: u8 },
}

impl FromStr for SearchMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exhaustive" | "full" => Ok(SearchMode::Exhaustive),
            "bounded" | "depth-bounded" | "heuristic" => Ok(SearchMode::DepthBounded {
                max_depth: DEFAULT_FADING_DEPTH,
            }),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub mode: SearchMode,
}

impl AiConfig {
    pub fn for_variant(variant: Variant) -> Self {
        let mode = match variant {
            Variant::Classic => SearchMode::Exhaustive,
            Variant::Fading => SearchMode::DepthBounded {
                max_depth: DEFAULT_FADING_DEPTH,
            },
        };
        Self { mode }
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_depth(mut self, max_depth: u8) -> Self {
        self.mode = SearchMode::DepthBounded { max_depth };
        self
    }

    /// 会移除棋子的规则下局面不单调收缩，穷举模式退化为默认限深。
    fn effective_mode(&self, variant: Variant) -> SearchMode {
        match self.mode {
            SearchMode::Exhaustive if variant.piece_limit().is_some() => {
                SearchMode::DepthBounded {
                    max_depth: DEFAULT_FADING_DEPTH,
                }
            }
            mode => mode,
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        AiConfig::for_variant(Variant::default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AiDecision {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell: Option<usize>,
    pub evaluation: i32,
    pub depth_reached: u8,
    pub nodes: u64,
    pub mode: SearchMode,
}

struct SearchStats {
    nodes: u64,
    depth_reached: u8,
}

impl SearchStats {
    fn new() -> Self {
        Self {
            nodes: 0,
            depth_reached: 0,
        }
    }
}

/// 搜索时使用的棋盘与记录副本，每个分支各自持有一份。
#[derive(Debug, Clone)]
struct Position {
    board: Board,
    ledger: MoveLedger,
}

impl Position {
    fn play(&self, mark: Mark, index: usize, variant: Variant) -> Position {
        let mut next = self.clone();
        apply_placement(&mut next.board, &mut next.ledger, mark, index, variant);
        next
    }
}

/// 单个搜索节点的深度、窗口与角色。
#[derive(Clone, Copy)]
struct Node {
    depth: u8,
    alpha: i32,
    beta: i32,
    maximizing: bool,
}

impl Node {
    fn root_child(alpha: i32) -> Self {
        Self {
            depth: 0,
            alpha,
            beta: i32::MAX,
            maximizing: false,
        }
    }

    fn child(self) -> Self {
        Self {
            depth: self.depth + 1,
            maximizing: !self.maximizing,
            ..self
        }
    }
}

/// 搜索上下文，整个搜索期间不变。
#[derive(Clone, Copy)]
struct SearchContext {
    computer: Mark,
    variant: Variant,
    mode: SearchMode,
}

pub struct AiAgent {
    config: AiConfig,
}

impl AiAgent {
    pub fn new(config: AiConfig) -> Self {
        Self { config }
    }

    /// 先校验外部传入的状态，再搜索。
    pub fn decide_checked_move(&self, state: &GameState) -> Result<AiDecision, IntegrityError> {
        state.integrity_check()?;
        Ok(self.decide_move(state))
    }

    /// 以当前执子方为电脑（最大化方）选出最佳格子。
    pub fn decide_move(&self, state: &GameState) -> AiDecision {
        let mut stats = SearchStats::new();
        let mode = self.config.effective_mode(state.variant);

        let Some(computer) = state.to_move() else {
            return AiDecision {
                cell: None,
                evaluation: 0,
                depth_reached: 0,
                nodes: 0,
                mode,
            };
        };

        let ctx = SearchContext {
            computer,
            variant: state.variant,
            mode,
        };
        let root = Position {
            board: state.board,
            ledger: state.ledger.clone(),
        };

        let mut best_cell = None;
        let mut best_score = i32::MIN;

        for cell in root.board.empty_cells() {
            let child = root.play(computer, cell, ctx.variant);
            let score = self.minimax_rec(&child, Node::root_child(best_score), ctx, &mut stats);
            if best_cell.is_none() || score > best_score {
                best_score = score;
                best_cell = Some(cell);
            }
        }

        let evaluation = if best_cell.is_some() { best_score } else { 0 };
        debug!(
            cell = ?best_cell,
            evaluation,
            nodes = stats.nodes,
            depth = stats.depth_reached,
            "computer move chosen"
        );

        AiDecision {
            cell: best_cell,
            evaluation,
            depth_reached: stats.depth_reached,
            nodes: stats.nodes,
            mode,
        }
    }

    fn minimax_rec(
        &self,
        position: &Position,
        mut node: Node,
        ctx: SearchContext,
        stats: &mut SearchStats,
    ) -> i32 {
        let Node {
            depth, maximizing, ..
        } = node;
        stats.nodes += 1;
        if depth > stats.depth_reached {
            stats.depth_reached = depth;
        }

        if let Some(win) = detect_winner(&position.board) {
            return Self::score_win(win.winner == ctx.computer, depth, ctx.mode);
        }

        match ctx.mode {
            SearchMode::Exhaustive if position.board.is_full() => return 0,
            SearchMode::DepthBounded { max_depth } if depth >= max_depth => return 0,
            _ => {}
        }

        let mover = if maximizing {
            ctx.computer
        } else {
            ctx.computer.opponent()
        };
        let mut value = if maximizing { i32::MIN } else { i32::MAX };
        let mut explored = false;

        for cell in position.board.empty_cells() {
            explored = true;
            let child = position.play(mover, cell, ctx.variant);
            let score = self.minimax_rec(&child, node.child(), ctx, stats);
            if maximizing {
                value = value.max(score);
                node.alpha = node.alpha.max(value);
            } else {
                value = value.min(score);
                node.beta = node.beta.min(value);
            }
            if node.beta <= node.alpha {
                break;
            }
        }

        if explored {
            value
        } else {
            0
        }
    }

    fn score_win(computer_won: bool, depth: u8, mode: SearchMode) -> i32 {
        match (mode, computer_won) {
            (SearchMode::Exhaustive, true) => 1,
            (SearchMode::Exhaustive, false) => -1,
            (SearchMode::DepthBounded { .. }, true) => BOUNDED_WIN_SCORE - i32::from(depth),
            (SearchMode::DepthBounded { .. }, false) => i32::from(depth) - BOUNDED_WIN_SCORE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{GameMode, RuleEngine};
    use rand::rngs::SmallRng;
    use rand::seq::IteratorRandom;
    use rand::SeedableRng;

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

    #[test]
    fn ai_handles_finished_game() {
        let state = play(Variant::Classic, &[0, 3, 1, 4, 2]);
        let agent = AiAgent::new(AiConfig::for_variant(Variant::Classic));
        let decision = agent.decide_move(&state);
        assert!(decision.cell.is_none());
        assert_eq!(decision.nodes, 0);
    }

    #[test]
    fn classic_blocks_open_row() {
        let state = play(Variant::Classic, &[0, 4, 1]);
        let agent = AiAgent::new(AiConfig::for_variant(Variant::Classic));
        let decision = agent.decide_move(&state);
        assert_eq!(decision.cell, Some(2), "O must block at 2");
        assert_eq!(decision.mode, SearchMode::Exhaustive);
    }

    #[test]
    fn classic_ties_break_toward_lowest_cell() {
        // 堵 2 形成双杀，与直接下 5 取胜同为 +1，取编号较小者
        let state = play(Variant::Classic, &[0, 3, 1, 4, 8]);
        let agent = AiAgent::new(AiConfig::for_variant(Variant::Classic));
        let decision = agent.decide_move(&state);
        assert_eq!(decision.cell, Some(2));
        assert_eq!(decision.evaluation, 1);
    }

    #[test]
    fn classic_perfect_play_is_a_draw() {
        let mut state = GameState::new(Variant::Classic, GameMode::TwoPlayer);
        let mut engine = RuleEngine::new();
        while !state.is_finished() {
            let agent = AiAgent::new(AiConfig::for_variant(Variant::Classic));
            let cell = agent
                .decide_move(&state)
                .cell
                .expect("unfinished classic game has a move");
            engine.place_mark(&mut state, cell).expect("chosen move should be legal");
        }
        assert!(state.is_draw(), "perfect play should draw, got {:?}", state.status);
    }

    #[test]
    fn fading_prefers_fastest_win() {
        let state = play(Variant::Fading, &[0, 3, 1, 4, 8]);
        let agent = AiAgent::new(AiConfig::for_variant(Variant::Fading));
        let decision = agent.decide_move(&state);
        assert_eq!(decision.cell, Some(5));
        assert_eq!(decision.evaluation, BOUNDED_WIN_SCORE);
    }

    #[test]
    fn fading_search_accounts_for_own_eviction() {
        // O 的记录为 [3, 4, 0]：下 5 会挤掉 3，只有下 8 才能连成 0-4-8
        let state = play(Variant::Fading, &[1, 3, 2, 4, 7, 0, 6]);
        assert_eq!(state.ledger.cells(Mark::O), &[3, 4, 0]);
        let agent = AiAgent::new(AiConfig::for_variant(Variant::Fading));
        let decision = agent.decide_move(&state);
        assert_eq!(decision.cell, Some(8));
        assert_eq!(decision.evaluation, BOUNDED_WIN_SCORE);
    }

    #[test]
    fn search_leaves_game_state_untouched() {
        let state = play(Variant::Fading, &[4, 0, 8, 2, 6]);
        let before = state.clone();
        let agent = AiAgent::new(AiConfig::for_variant(Variant::Fading));
        agent.decide_move(&state);
        assert_eq!(state, before);
    }

    #[test]
    fn fading_search_never_exceeds_depth_bound() {
        let mut rng = SmallRng::seed_from_u64(42);
        let mut engine = RuleEngine::new();
        for _ in 0..3 {
            let mut state = GameState::new(Variant::Fading, GameMode::TwoPlayer);
            for _ in 0..8 {
                if state.is_finished() {
                    break;
                }
                let agent = AiAgent::new(AiConfig::for_variant(Variant::Fading));
                let decision = agent.decide_move(&state);
                assert!(decision.depth_reached <= DEFAULT_FADING_DEPTH);
                assert!(decision.cell.is_some());

                let index = state
                    .board
                    .empty_cells()
                    .choose(&mut rng)
                    .expect("fading board always keeps empty cells");
                engine.place_mark(&mut state, index).expect("random move should be legal");
                assert!(state.integrity_check().is_ok());
            }
        }
    }

    #[test]
    fn shallower_bound_is_respected() {
        let state = play(Variant::Fading, &[4]);
        let agent = AiAgent::new(AiConfig::for_variant(Variant::Fading).with_max_depth(2));
        let decision = agent.decide_move(&state);
        assert!(decision.depth_reached <= 2);
        assert_eq!(decision.mode, SearchMode::DepthBounded { max_depth: 2 });
    }

    #[test]
    fn exhaustive_request_on_fading_board_stays_bounded() {
        let state = play(Variant::Fading, &[4]);
        let agent =
            AiAgent::new(AiConfig::for_variant(Variant::Fading).with_mode(SearchMode::Exhaustive));
        let decision = agent.decide_move(&state);
        assert_eq!(
            decision.mode,
            SearchMode::DepthBounded {
                max_depth: DEFAULT_FADING_DEPTH
            }
        );
    }

    #[test]
    fn corrupted_state_is_refused_before_searching() {
        let mut state = play(Variant::Fading, &[0, 3, 1, 4]);
        state.ledger.x = vec![9, 0, 1];
        let agent = AiAgent::new(AiConfig::for_variant(Variant::Fading));
        assert_eq!(
            agent.decide_checked_move(&state),
            Err(IntegrityError::InvalidLedgerEntry {
                mark: Mark::X,
                index: 9,
            })
        );

        let valid = play(Variant::Fading, &[0, 3, 1, 4]);
        assert_eq!(
            agent.decide_checked_move(&valid),
            Ok(agent.decide_move(&valid))
        );
    }

    #[test]
    fn search_mode_parses_from_aliases() {
        assert_eq!("full".parse::<SearchMode>(), Ok(SearchMode::Exhaustive));
        assert_eq!(
            "Heuristic".parse::<SearchMode>(),
            Ok(SearchMode::DepthBounded { max_depth: 6 })
        );
    }
}
