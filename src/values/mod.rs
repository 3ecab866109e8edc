pub mod error;
pub mod list;
pub mod map;
pub mod objid;
pub mod var;
pub mod waif;

pub use error::Error;
pub use list::List;
pub use map::{Map, MapKey};
pub use objid::Objid;
pub use var::Var;
pub use waif::Waif;
