pub mod error;
pub mod message;
pub mod resource;
pub mod snapshot;
pub mod state;

pub use error::*;
pub use message::*;
pub use resource::*;
pub use snapshot::*;
pub use state::*;
