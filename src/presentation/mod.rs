//! Server-rendered HTML views.

pub mod views;
