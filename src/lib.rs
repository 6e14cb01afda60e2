//! Yatube: a small social blogging service.
//!
//! Posts may belong to a group, readers comment on them, and authenticated
//! users subscribe to authors to build a personal feed.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
