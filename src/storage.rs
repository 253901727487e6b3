//! 存储模块。基于SQLite的持久化实现。
pub mod agent;
pub mod model;
pub mod schema;

pub use agent::Agent;
