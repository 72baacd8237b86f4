pub mod classifier;
pub mod keywords;
pub mod known_companies;
pub mod rules;
