pub mod cache;
pub mod campay;
mod db;
mod helpers;
pub mod payments;
pub mod rates;
mod schema;
pub mod signup;
pub mod token_cache;
pub mod transfers;
pub mod webhook;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use db::*;
pub use helpers::*;
pub use schema::*;
