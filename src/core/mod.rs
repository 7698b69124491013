pub mod cancel;
pub mod domain;
pub mod execution;
pub mod fs;
pub mod grader;
pub mod pipeline;
pub mod temp;
pub mod traits;
pub mod verdict;
