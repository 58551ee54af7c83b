//! App - アプリケーション層
//!
//! ports とキューを組み合わせて、プロデューサー向けの表面を提供します。
//!
//! # 主要コンポーネント
//! - **QueueBuilder**: 構築とワイヤリング、起動時検証
//! - **OfflineQueue**: queue_event / register_processor / set_online_status / get_queue_stats

pub mod builder;
pub mod offline;

pub use self::builder::{BuildError, QueueBuilder};
pub use self::offline::OfflineQueue;
