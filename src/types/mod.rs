pub mod frequency;
pub mod request;
