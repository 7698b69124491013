//! Local judge engine: compiles a candidate solution, runs it against test
//! cases under time and memory limits and classifies the outcome into a
//! competitive-programming verdict. Special judges (checkers), interactive
//! problems and stress testing are supported.

pub mod config;
pub mod constants;
pub mod core;
pub mod judge;
pub mod native;
