#![no_std]
#![forbid(unsafe_code)]

pub mod canvas_font;
pub mod canvas_ops;
pub mod damage;

pub use damage::{DamageTracker, InternalDamageTracker};
