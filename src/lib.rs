//! Scrubbable replay of recorded scene animations.
//!
//! A recording is an initial frame, a final frame and a log of bidirectional
//! transitions. `engine::replay` moves a `frame::FrameStore` between any two
//! steps of the log; `player::PlaybackController` drives it over time.

pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod player;
pub mod renderer;
pub mod types;
