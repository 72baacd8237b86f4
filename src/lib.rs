pub mod classification;
pub mod clustering;
pub mod enrichment;
pub mod matching;
pub mod models;
pub mod utils;
pub mod validation;
