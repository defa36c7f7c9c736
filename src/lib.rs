//! # fce-bridge
//!
//! Keeps code that lives in fields of Frappe documents (server scripts,
//! report queries, print formats, web page styles) editable as local files.
//!
//! A file says where its code belongs with header lines containing a marker
//! (`FCE-EDITOR` by default):
//!
//! ```text
//! -- FCE-EDITOR --doctype Report --docname "Sales Summary" --docfield query
//! select name, grand_total from `tabSales Invoice`
//! -- FCE-EDITOR console --type SQL
//! select count(*) from `tabSales Invoice`
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌──────────┐   ┌───────────────┐
//! │ discover │──▶│   blocks   │──▶│   sync   │──▶│    gateway    │
//! │  (glob)  │   │ args/parse │   │ per block│   │ Frappe REST   │
//! └──────────┘   └────────────┘   └────┬─────┘   └───────────────┘
//!                                      │
//!                 ┌──────────┐         │          ┌──────────┐
//!                 │  watch   │─────────┘          │   pull   │
//!                 │ debounce │                    │ remote → │
//!                 └──────────┘                    │  files   │
//!                                                 └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`args`] | Header argument tokenizer |
//! | [`blocks`] | Marker-delimited block parser |
//! | [`normalize`] | Filesystem-safe document names |
//! | [`config`] | TOML configuration + environment overrides |
//! | [`discover`] | Glob-based file discovery |
//! | [`gateway`] | Remote document gateway trait and HTTP client |
//! | [`sync`] | Push orchestration |
//! | [`watch`] | Watch mode and per-file debounce |
//! | [`pull`] | Remote-to-local file mirroring |
//! | [`report`] | User-facing progress messages |
//! | [`error`] | Parser and gateway error types |

pub mod args;
pub mod blocks;
pub mod config;
pub mod discover;
pub mod error;
pub mod gateway;
pub mod normalize;
pub mod pull;
pub mod report;
pub mod sync;
pub mod watch;
