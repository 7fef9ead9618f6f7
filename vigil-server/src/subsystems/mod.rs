//! Background subsystems for the Vigil server
//!
//! The reporting pipeline, stage by stage: `window` resolves what is new,
//! `aggregate` averages it, `commits` and `chatlog` fetch the activity
//! signals, `synth` turns it all into text, `store` persists it, and
//! `reporter` drives the whole pass on a schedule.

pub mod aggregate;
pub mod chatlog;
pub mod commits;
pub mod reporter;
pub mod store;
pub mod synth;
pub mod window;
