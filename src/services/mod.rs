pub mod staging;
pub mod token_service;
pub mod visual_search;
