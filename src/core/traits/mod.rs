pub mod compiler;
pub mod executor;
pub mod judge;
pub mod runner;
