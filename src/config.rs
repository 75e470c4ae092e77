// src/config.rs

use std::{env, str::FromStr};
use dotenvy::dotenv;

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. When unset the server runs on the in-memory store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub rust_log: String,
    pub bind_addr: String,
    /// Maximum number of entries held by each read cache.
    pub cache_capacity: usize,
    /// Reply levels materialized below a comment before the tree is truncated.
    pub max_reply_depth: usize,
    /// Post ids registered on startup when running on the in-memory store.
    pub seed_posts: Vec<i64>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        Self {
            database_url,
            jwt_secret,
            rust_log,
            bind_addr,
            cache_capacity: parse_or("CACHE_CAPACITY", 1024),
            max_reply_depth: parse_or("MAX_REPLY_DEPTH", 64),
            seed_posts: parse_list("SEED_POSTS"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            jwt_secret: String::new(),
            rust_log: "info".to_string(),
            bind_addr: "0.0.0.0:3000".to_string(),
            cache_capacity: 1024,
            max_reply_depth: 64,
            seed_posts: Vec::new(),
        }
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring unparsable {}={:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

fn parse_list(key: &str) -> Vec<i64> {
    let Ok(raw) = env::var(key) else {
        return Vec::new();
    };
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .filter_map(|item| match item.parse() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!("Ignoring unparsable {} entry {:?}", key, item);
                None
            }
        })
        .collect()
}
