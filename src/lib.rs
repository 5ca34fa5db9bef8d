pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod replicate;
pub mod routes;
pub mod stability;
pub mod storage;
pub mod studio;
pub mod validation;

#[cfg(test)]
mod test_support;
