//! RESP-like response framing (§6): simple strings, integers, errors, bulk
//! strings (with a null variant), and arrays of bulk strings.

use std::io::{self, Write};

const TERM: &str = "\r\n";

pub fn write_simple_string(w: &mut impl Write, msg: &str) -> io::Result<()> {
    write!(w, "+{msg}{TERM}")
}

pub fn write_ok(w: &mut impl Write) -> io::Result<()> {
    write_simple_string(w, "OK")
}

pub fn write_pong(w: &mut impl Write) -> io::Result<()> {
    write_simple_string(w, "PONG")
}

pub fn write_int(w: &mut impl Write, value: i64) -> io::Result<()> {
    write!(w, ":{value}{TERM}")
}

pub fn write_error(w: &mut impl Write, msg: &str) -> io::Result<()> {
    write!(w, "-ERR {msg}{TERM}")
}

pub fn write_bulk_string(w: &mut impl Write, data: &[u8]) -> io::Result<()> {
    write!(w, "${}{TERM}", data.len())?;
    w.write_all(data)?;
    write!(w, "{TERM}")
}

pub fn write_null(w: &mut impl Write) -> io::Result<()> {
    write!(w, "$-1{TERM}")
}

pub fn write_array(w: &mut impl Write, items: &[Vec<u8>]) -> io::Result<()> {
    write!(w, "*{}{TERM}", items.len())?;
    for item in items {
        write_bulk_string(w, item)?;
    }
    Ok(())
}
