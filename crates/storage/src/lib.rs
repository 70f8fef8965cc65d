#![forbid(unsafe_code)]

pub mod repository;
pub mod retry;
pub mod sampling;
pub mod sqlite;
