//! Article extraction and person-sentence parsing.

pub mod article;
pub mod person;
