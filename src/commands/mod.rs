pub mod start;
pub mod timezone;
pub mod vocab;
