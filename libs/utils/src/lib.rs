pub mod digest;
pub mod query;
pub mod serde;
pub mod string;
pub mod time;

pub use query::QueryMap;
