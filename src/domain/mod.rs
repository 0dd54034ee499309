//! Core domain types and logic.

pub mod ohlcv;
pub mod timeframe;
pub mod series;
pub mod align;
pub mod indicator;
pub mod indicator_cache;
pub mod expr;
pub mod expr_parser;
pub mod expr_eval;
pub mod param_space;
pub mod simulation;
pub mod metrics;
pub mod objective;
pub mod evaluator;
pub mod sampler;
pub mod study;
pub mod walk_forward;
pub mod settings;
pub mod request;
pub mod response;
pub mod pipeline;
pub mod error;
