//! # tooldex
//!
//! A local-first catalog service for an AI tools directory.
//!
//! Tooldex keeps a static, bundled catalog of AI tools and lets users
//! browse it through a filter/sort/pagination pipeline, review tools,
//! submit new ones, and shortlist favorites and comparisons. Everything
//! persisted goes through a pluggable storage backend; everything
//! client-local (preferences, shortlists, analytics) lives in a JSON
//! key-value namespace on disk.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────┐   ┌──────────────────┐
//! │  Catalog pipeline  │   │ Collection svcs  │
//! │ filter/sort/page   │   │ reviews/submits  │
//! └────────┬───────────┘   └────────┬─────────┘
//!          │                        ▼
//!          │               ┌──────────────────┐
//!          │               │ Backend + Identity│
//!          │               │ local/rest/      │
//!          │               │ firestore/supabase│
//!          │               └────────┬─────────┘
//!          ▼                        ▼
//!     ┌──────────────────────────────────┐
//!     │      kv namespace (one blob/key) │
//!     └──────────────────────────────────┘
//!              ▲                ▲
//!         ┌────┴────┐      ┌────┴────┐
//!         │   CLI   │      │  HTTP   │
//!         │  (tdx)  │      │  server │
//!         └─────────┘      └─────────┘
//! ```
//!
//! ## Quick start
//!
//! ```bash
//! tdx init                                  # create the local store
//! tdx browse "image" --pricing Free         # filtered catalog page
//! tdx review add 4 --rating 5 --name Ada "Runs on my own GPU"
//! tdx auth register ada@example.com Ada --password secret1
//! tdx serve                                 # REST API for other clients
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and backend selection |
//! | [`models`] | Catalog and collection record types |
//! | [`kv`] | Local key-value namespace primitive |
//! | [`store`] | Backend/Identity traits, errors, selection factory |
//! | [`store_local`] | Local JSON adapter |
//! | [`store_rest`] | Generic REST adapter |
//! | [`store_firestore`] | Firestore adapter |
//! | [`store_supabase`] | Supabase adapter |
//! | [`catalog`] | Static tool dataset |
//! | [`query`] | Filter, sort, and pagination pipeline |
//! | [`prefs`] | Filter persistence and the shareable URL codec |
//! | [`favorites`] | Favorites and the comparison set |
//! | [`reviews`] | Review service |
//! | [`submissions`] | Submission service |
//! | [`admin`] | Back-office operations |
//! | [`analytics`] | Search events, error log, chat transcript |
//! | [`browse`] | Interactive browse session with debounce |
//! | [`server`] | HTTP API |

pub mod admin;
pub mod analytics;
pub mod browse;
pub mod catalog;
pub mod config;
pub mod favorites;
pub mod kv;
pub mod models;
pub mod prefs;
pub mod query;
pub mod reviews;
pub mod server;
pub mod store;
pub mod store_firestore;
pub mod store_local;
pub mod store_rest;
pub mod store_supabase;
pub mod submissions;
