pub mod gateway;
pub mod jobs;
pub mod recovery;
pub mod summarize;
