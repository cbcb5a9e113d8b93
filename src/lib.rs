//! `Memoria` - round-flow engine for a physical light-pattern memory game
//!
//! The device shows a light pattern, the player reproduces it on physical
//! buttons, and this library runs everything around it: the
//! prepare/memorize/turn cycle, status polling, score and streak keeping,
//! motivational holds and adaptive difficulty via an external predictor.

pub mod cli;
pub mod config;
pub mod device;
pub mod driver;
pub mod engine;
pub mod error;
pub mod notify;
pub mod observability;
