//! Line-based request parsing and RESP-like response encoding (§4.H, §6).

mod command;
mod response;

pub use command::{parse, Command, ProtocolError};
pub use response::{
    write_array, write_bulk_string, write_error, write_int, write_null, write_ok, write_pong,
    write_simple_string,
};
