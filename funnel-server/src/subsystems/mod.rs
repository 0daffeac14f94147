pub mod assistant;
pub mod dispatch;
pub mod webhook;
