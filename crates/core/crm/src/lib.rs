mod client;
mod models;
mod token;

pub use client::*;
pub use models::*;
pub use token::*;
