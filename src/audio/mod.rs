//! The live signal graph: master bus and per-track channels.
//!
//! Everything in here is a plain owned value with an explicit lifecycle -
//! the application constructs one bus and one rack at startup, tests build
//! isolated instances freely. The audio callback drives both through
//! [`channel::ChannelRack::render_block`] followed by
//! [`bus::AudioBus::render_block`]; the UI thread only writes ramp targets
//! and issues note on/off calls, never blocks on rendering.

pub mod bus;
pub mod channel;

pub use bus::AudioBus;
pub use channel::ChannelRack;
