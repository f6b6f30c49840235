//! Hotkey module for terminal keyboard input
//!
//! Reads key presses from the terminal and classifies them against the
//! global shortcut table.

mod keys;
mod listener;

pub use keys::{global_shortcut, Key, KeyPress, Shortcut};
pub use listener::{HotkeyEvent, HotkeyListener};
