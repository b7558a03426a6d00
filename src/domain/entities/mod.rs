pub mod debate;
pub mod order;
pub mod order_book;
pub mod position;
pub mod signal;
pub mod trade_decision;
