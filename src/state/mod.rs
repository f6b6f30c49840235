//! Navigation module
//!
//! The application is a set of top-level modules:
//! - Home: main menu
//! - Document: document upload and Q&A
//! - Braille: answer sheet evaluation
//! - Quiz: voice quiz
//! - History: audio history lessons

mod machine;

pub use machine::{Module, Navigator};
