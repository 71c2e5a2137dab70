//! Side-effect tools the control loop dispatches to.
//!
//! - `write`: persist the extracted code block to the working file
//! - `run`: execute the working file and capture its output

pub mod run;
pub mod write;
