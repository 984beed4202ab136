pub mod engagement;
pub mod vocabulary;
