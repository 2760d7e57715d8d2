//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **EngineBuilder**: エンジンの構築とワイヤリング
//! - **Runtime**: submit / getTask / listTasks / getStats
//! - **ClaimProtocol**: 実行権の原子的な獲得
//! - **WorkerLoop**: タスク実行ループ（pop→claim→handle→decide→complete）
//! - **ReaperLoop**: zombie と通知の取りこぼしの回収
//! - **idempotent**: 台帳による副作用の一回性

pub mod builder;
pub mod claim;
pub mod context;
pub mod idempotent;
pub mod reaper_loop;
pub mod runtime;
pub mod status;
pub mod worker_loop;

#[cfg(test)]
pub(crate) mod test_support;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, Engine, EngineBuilder};
pub use self::claim::{ClaimOutcome, ClaimProtocol, SkipReason};
pub use self::context::EngineContext;
pub use self::idempotent::run_once;
pub use self::reaper_loop::{ReapReport, ReaperLoop};
pub use self::runtime::{Runtime, SubmitRequest, Submission, TaskQuery};
pub use self::status::{StatusCounts, TaskStats};
pub use self::worker_loop::{ProcessOutcome, WorkerGroup, WorkerLoop};
