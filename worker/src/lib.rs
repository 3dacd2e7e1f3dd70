//! Hosts minesweeper sessions: one actor per game, a work executor for board
//! generation and move resolution, and the gateway a front end talks to.

pub use client::*;
pub use clock::*;
pub use gateway::*;
pub use registry::*;
pub use session::*;
pub use settings::*;
pub use work::*;

pub mod cli;
mod client;
mod clock;
mod gateway;
mod registry;
mod session;
mod settings;
mod work;
