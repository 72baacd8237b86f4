pub mod core;
pub mod evidence;
pub mod matching;
pub mod stats_models;
