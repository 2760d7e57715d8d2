//! spindle-core
//!
//! Durable, at-least-once background task engine.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task_type, task, state, ledger, errors, retry, decision）
//! - **ports**: 抽象化レイヤー（TaskStore, DeliveryQueue, Ledger, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（builder, runtime, claim, worker_loop, reaper_loop, idempotent）
//! - **typed**: 型付き Task API（Task trait, Handler trait, TypedRegistry）
//! - **impls**: in-memory 実装（開発用・テスト用）
//! - **handlers**: 組み込みのデモ用 handler
//! - **config** / **error** / **observability**: 設定、エラー型、ログ初期化

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod typed;

pub use crate::app::{Engine, EngineBuilder, Runtime, SubmitRequest, Submission, TaskQuery};
pub use crate::config::EngineConfig;
pub use crate::error::EngineError;
