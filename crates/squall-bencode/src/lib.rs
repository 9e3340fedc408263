//! A strict [Bencode](https://www.bittorrent.org/beps/bep_0003.html) codec.
//!
//! Three layers are exposed, from highest to lowest:
//!
//! - [`Value`], an owning tree with dictionaries kept in canonical key order,
//!   plus [`encode`] and [`decode`] for canonical round trips.
//! - [`PushParser`] and [`EventSink`], an event-driven parser that streams
//!   tokens into a sink without building a tree. [`ValueBuilder`],
//!   [`JsonWriter`] and [`DebugWriter`] are the provided sinks.
//! - [`DescriptorTable`], a zero-copy parse over an external byte buffer.
//!   Descriptors index into the buffer and a [`Cursor`] navigates the tree
//!   without copying string or integer bytes.
//!
//! All parsers reject the same inputs: leading zeros, `-0`, unsorted or
//! duplicate dictionary keys, and truncated tokens. Errors carry the byte
//! offset of the offending token.

pub mod descriptor;
pub mod encode;
pub mod error;
pub mod events;
pub mod push;
mod scan;
pub mod value;

pub use descriptor::{Cursor, Descriptor, DescriptorKind, DescriptorTable};
pub use encode::{encode, encode_into};
pub use error::{BencodeError, ErrorKind};
pub use events::{DebugWriter, EventSink, JsonWriter, ValueBuilder};
pub use push::{decode, PushParser};
pub use value::{Dict, Value};
