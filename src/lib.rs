//! wetterochs: reads out the latest Wetterochs weather mail.
//!
//! The newest item of the wettermail RSS feed is rendered into SSML and card
//! text, cached (in memory and on disk) and refreshed every 15 minutes. Skill
//! requests are answered from the cache without touching the network.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod feed;
pub mod refresh;
pub mod store;
pub mod transform;
