// src/store/mod.rs
//! Durable append-only stores. `LineStore` is a plain one-line-per-record
//! file; `JsonArrayStore` keeps records inside a single JSON array and
//! serializes writers across processes with a lock marker.

pub mod json_array;
pub mod line;

pub use json_array::JsonArrayStore;
pub use line::LineStore;
