// src/tasks/mod.rs

pub mod token_refresh;
