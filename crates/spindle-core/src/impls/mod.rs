//! Impls - ports の in-memory 実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryTaskStore**: テスト用の正本
//! - **InMemoryDeliveryQueue**: 開発用の配送キュー（遅延配送つき）
//! - **InMemoryLedger**: 開発用の冪等性台帳
//!
//! 本番用の実装（RDB / Redis）は ports の trait を実装する別クレートに置く想定。

pub mod inmem_delivery;
pub mod inmem_ledger;
pub mod inmem_store;

pub use self::inmem_delivery::InMemoryDeliveryQueue;
pub use self::inmem_ledger::InMemoryLedger;
pub use self::inmem_store::InMemoryTaskStore;
