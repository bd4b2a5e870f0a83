pub mod batch;
pub mod connection;
pub mod record;
pub mod register;
pub mod registry;
pub mod span;
pub mod writable;

pub use batch::*;
pub use connection::{
  ConnectError, Connection, Destination, Params, ReadError, WriteError,
  MAX_READ_QUANTITY,
};
pub use record::*;
pub use register::*;
pub use registry::*;
pub use span::*;
pub use writable::*;
