//! Task trait - 型付き payload の定義
//!
//! # 学習ポイント
//! - Associated Constants (`const TYPE`)
//! - Trait bounds の組み合わせ (Serialize + DeserializeOwned + Send + Sync + 'static)

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Task は task_type と payload の型を対応付ける
///
/// # 使用例
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct SendEmail {
///     to: String,
/// }
///
/// impl Task for SendEmail {
///     const TYPE: &'static str = "send_email";
/// }
/// ```
///
/// # Trait Bounds
/// - `Serialize`: submit 時に payload へ変換するため
/// - `DeserializeOwned`: payload からの復元のため（'static に対応）
/// - `Send + Sync`: 複数 worker から安全に使えるため
pub trait Task: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// dispatch key
    const TYPE: &'static str;
}
