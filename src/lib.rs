mod api;
pub mod codec;
mod config;
mod countries;
mod db;
mod error;
mod gate;
mod routes;
mod store;
mod tokens;
mod types;

pub use api::*;
pub use config::*;
pub use countries::*;
pub use db::*;
pub use error::*;
pub use gate::*;
pub use routes::*;
pub use store::*;
pub use tokens::*;
pub use types::*;
