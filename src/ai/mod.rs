//! 电脑对手（极小化极大搜索）。

pub mod minimax;

pub use minimax::{AiAgent, AiConfig, AiDecision, SearchMode, DEFAULT_FADING_DEPTH};
