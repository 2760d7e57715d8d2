//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（RDB, Redis など）へのインターフェースを提供し、
//! 実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - TaskStore が source of truth（正本）
//! - DeliveryQueue は配送キュー（task_id のみ）
//! - Ledger は外部副作用の冪等性の証明

pub mod clock;
pub mod delivery_queue;
pub mod id_generator;
pub mod ledger;
pub mod task_store;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::delivery_queue::{DeliveryQueue, QueueError};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::ledger::{Ledger, LedgerError, PutOutcome};
pub use self::task_store::{
    Insertion, StoreError, TaskFilter, TaskPatch, TaskStore, UpdateCondition,
};
