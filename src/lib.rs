pub mod compose;
pub mod config;
pub mod demotivator;
pub mod error;
pub mod horoscope;
pub mod instagram;
pub mod jobs;
pub mod model;
pub mod scheduler;
pub mod screenshot;
pub mod text;
pub mod upload;
pub mod used_ids;
