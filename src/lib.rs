pub mod ai;
pub mod game;

use std::cell::RefCell;
use std::rc::Rc;
use std::str::FromStr;

use gloo_timers::future::TimeoutFuture;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::console;
use web_sys::js_sys::Function;

pub use ai::{AiAgent, AiConfig, AiDecision, SearchMode, DEFAULT_FADING_DEPTH};
pub use game::{
    apply_placement, detect_winner, submit_checked_move, submit_move, AiMoveResponse, Board, Cell,
    GameEvent, GameMode, GameSnapshot, GameState, GameStatus, IntegrityError, Line, Mark,
    MoveLedger, MoveRejection, RuleEngine, RuleResolution, SchedulerConfig, SchedulerPhase,
    ThinkingTicket, TurnScheduler, Variant, WinningLine, BOARD_SIZE, DEFAULT_THINKING_DELAY_MS,
    FADING_PIECE_LIMIT, WIN_LINES,
};

#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    set_panic_hook();
}

fn to_js_error(error: MoveRejection) -> JsValue {
    to_value(&error).unwrap_or_else(|serialize_err| JsValue::from_str(&serialize_err.to_string()))
}

fn integrity_to_js_error(error: IntegrityError) -> JsValue {
    to_value(&error).unwrap_or_else(|serialize_err| JsValue::from_str(&serialize_err.to_string()))
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn parse_variant(value: Option<&str>) -> Result<Variant, JsValue> {
    match value {
        None => Ok(Variant::default()),
        Some(value) => Variant::from_str(value)
            .map_err(|_| JsValue::from_str(&format!("unknown variant: {value}"))),
    }
}

fn parse_mode(value: Option<&str>) -> Result<GameMode, JsValue> {
    match value {
        None => Ok(GameMode::default()),
        Some(value) => GameMode::from_str(value)
            .map_err(|_| JsValue::from_str(&format!("unknown game mode: {value}"))),
    }
}

fn snapshot_to_json(scheduler: &TurnScheduler) -> Result<String, JsValue> {
    serde_json::to_string(&scheduler.snapshot()).map_err(serde_to_js_error)
}

fn make_response_json(response: &AiMoveResponse) -> Result<String, JsValue> {
    serde_json::to_string(response).map_err(serde_to_js_error)
}

fn notify_change(
    scheduler: &RefCell<TurnScheduler>,
    on_change: &RefCell<Option<Function>>,
    response: Option<&AiMoveResponse>,
) {
    let json = match snapshot_to_json(&scheduler.borrow()) {
        Ok(json) => json,
        Err(error) => {
            console::error_1(&error);
            return;
        }
    };
    let applied = match response.map(make_response_json).transpose() {
        Ok(applied) => applied.map_or(JsValue::NULL, |json| JsValue::from_str(&json)),
        Err(error) => {
            console::error_1(&error);
            JsValue::NULL
        }
    };
    if let Some(callback) = on_change.borrow().as_ref() {
        if let Err(error) = callback.call2(&JsValue::NULL, &JsValue::from_str(&json), &applied) {
            console::error_1(&error);
        }
    }
}

#[wasm_bindgen]
pub struct GameEngine {
    scheduler: Rc<RefCell<TurnScheduler>>,
    on_change: Rc<RefCell<Option<Function>>>,
}

#[wasm_bindgen]
impl GameEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(variant: Option<String>, mode: Option<String>) -> Result<GameEngine, JsValue> {
        let variant = parse_variant(variant.as_deref())?;
        let mode = parse_mode(mode.as_deref())?;
        Ok(GameEngine::from_scheduler(TurnScheduler::new(variant, mode)))
    }

    pub fn snapshot(&self) -> Result<JsValue, JsValue> {
        to_value(&self.scheduler.borrow().snapshot()).map_err(JsValue::from)
    }

    #[wasm_bindgen(js_name = "snapshotJson")]
    pub fn snapshot_json(&self) -> Result<String, JsValue> {
        snapshot_to_json(&self.scheduler.borrow())
    }

    #[wasm_bindgen(js_name = "stateJson")]
    pub fn state_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(self.scheduler.borrow().state()).map_err(serde_to_js_error)
    }

    #[wasm_bindgen(js_name = "isThinking")]
    pub fn is_thinking(&self) -> bool {
        self.scheduler.borrow().is_thinking()
    }

    /// 注册回调，电脑落子生效后以 `(快照 JSON, 结算 JSON)` 调用。
    #[wasm_bindgen(js_name = "onChange")]
    pub fn on_change(&mut self, callback: Option<Function>) {
        *self.on_change.borrow_mut() = callback;
    }

    /// 人类选择格子，返回落子后的快照；非法输入不改变状态。
    #[wasm_bindgen(js_name = "chooseCell")]
    pub fn choose_cell(&mut self, index: u32) -> Result<String, JsValue> {
        let outcome = self.scheduler.borrow_mut().choose_cell(index as usize);
        match outcome {
            Ok(Some(ticket)) => self.schedule_computer(ticket),
            Ok(None) => {}
            Err(rejection) => {
                console::warn_1(&format!("move rejected: {rejection}").into());
            }
        }
        self.snapshot_json()
    }

    /// 与 `chooseCell` 相同，但非法输入以错误对象返回。
    #[wasm_bindgen(js_name = "tryChooseCell")]
    pub fn try_choose_cell(&mut self, index: u32) -> Result<String, JsValue> {
        let outcome = self.scheduler.borrow_mut().choose_cell(index as usize);
        if let Some(ticket) = outcome.map_err(to_js_error)? {
            self.schedule_computer(ticket);
        }
        self.snapshot_json()
    }

    #[wasm_bindgen(js_name = "resetGame")]
    pub fn reset_game(&mut self, variant: Option<String>) -> Result<String, JsValue> {
        let variant = variant
            .as_deref()
            .map(|value| parse_variant(Some(value)))
            .transpose()?;
        let ticket = self.scheduler.borrow_mut().reset(variant);
        self.schedule_pending(ticket);
        self.snapshot_json()
    }

    #[wasm_bindgen(js_name = "setVariant")]
    pub fn set_variant(&mut self, variant: &str) -> Result<String, JsValue> {
        let variant = parse_variant(Some(variant))?;
        let ticket = self.scheduler.borrow_mut().set_variant(variant);
        self.schedule_pending(ticket);
        self.snapshot_json()
    }

    #[wasm_bindgen(js_name = "setMode")]
    pub fn set_mode(&mut self, mode: &str) -> Result<String, JsValue> {
        let mode = parse_mode(Some(mode))?;
        let ticket = self.scheduler.borrow_mut().set_mode(mode);
        self.schedule_pending(ticket);
        self.snapshot_json()
    }
}

impl GameEngine {
    /// 包装一个已配置好的调度器；电脑先手时立即安排其落子。
    pub fn from_scheduler(scheduler: TurnScheduler) -> GameEngine {
        let pending = scheduler.pending();
        let engine = GameEngine {
            scheduler: Rc::new(RefCell::new(scheduler)),
            on_change: Rc::new(RefCell::new(None)),
        };
        engine.schedule_pending(pending);
        engine
    }

    fn schedule_pending(&self, ticket: Option<ThinkingTicket>) {
        if let Some(ticket) = ticket {
            self.schedule_computer(ticket);
        }
    }

    fn schedule_computer(&self, ticket: ThinkingTicket) {
        let scheduler = Rc::clone(&self.scheduler);
        let on_change = Rc::clone(&self.on_change);

        spawn_local(async move {
            if ticket.delay_ms > 0 {
                TimeoutFuture::new(ticket.delay_ms).await;
            }
            let result = scheduler.borrow_mut().complete_computer_move(ticket);
            match result {
                Ok(response) => notify_change(&scheduler, &on_change, Some(&response)),
                // 重置后的旧凭据，直接丢弃
                Err(MoveRejection::StaleComputerMove) => {}
                Err(rejection) => {
                    console::warn_1(&format!("computer move failed: {rejection}").into());
                    notify_change(&scheduler, &on_change, None);
                }
            }
        });
    }
}

/// 创建一局空白对局状态。
#[wasm_bindgen(js_name = "createGameState")]
pub fn create_game_state(variant: Option<String>, mode: Option<String>) -> Result<JsValue, JsValue> {
    let state = GameState::new(
        parse_variant(variant.as_deref())?,
        parse_mode(mode.as_deref())?,
    );
    to_value(&state).map_err(JsValue::from)
}

/// 在给定状态上提交一步棋，非法输入时原样返回；状态本身损坏时报错。
#[wasm_bindgen(js_name = "submitMove")]
pub fn submit_move_js(state: JsValue, index: u32) -> Result<JsValue, JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    let next = submit_checked_move(&state, index as usize).map_err(integrity_to_js_error)?;
    to_value(&next).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "detectWinner")]
pub fn detect_winner_js(cells: JsValue) -> Result<JsValue, JsValue> {
    let cells: [Cell; BOARD_SIZE] = from_value(cells).map_err(JsValue::from)?;
    to_value(&detect_winner(&Board::from_cells(cells))).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "computeAiMove")]
pub fn compute_ai_move(state: JsValue, mode: Option<String>) -> Result<JsValue, JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    let mut config = AiConfig::for_variant(state.variant);
    if let Some(mode) = mode
        .as_deref()
        .and_then(|value| SearchMode::from_str(value).ok())
    {
        config = config.with_mode(mode);
    }
    let decision = AiAgent::new(config)
        .decide_checked_move(&state)
        .map_err(integrity_to_js_error)?;
    to_value(&decision).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "validateState")]
pub fn validate_state(state: JsValue) -> Result<(), JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    state.integrity_check().map_err(integrity_to_js_error)
}

#[cfg(feature = "console_error_panic_hook")]
fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
fn set_panic_hook() {}
