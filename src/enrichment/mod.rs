pub mod apply;
pub mod providers;
pub mod worker;
