//! 显示层实现

pub mod console_view;

pub use console_view::ConsoleView;
