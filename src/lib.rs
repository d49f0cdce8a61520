//! Substack Classic - Substack newsletters as an old-fashioned newspaper
//!
//! A newsletter's feed is fetched through an RSS-to-JSON proxy and laid out
//! as a front page, with one page per story. Pages are addressed by URL
//! fragment (`#/@name`, `#/@name/story/id`) and rendered on the server.

pub mod config;
pub mod controller;
pub mod debounce;
pub mod dice;
pub mod feed;
pub mod format;
pub mod layout;
pub mod live;
pub mod render;
pub mod router;
pub mod routes;
pub mod state;
