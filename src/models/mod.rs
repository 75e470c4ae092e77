// src/models/mod.rs

pub mod comment;
pub mod post;
pub mod vote;
