//! Reference-counted, copy-on-write text values with pooled storage.
//!
//! [`Text`] behaves like an ordinary owned string but clones in O(1):
//! values share a storage cell until one of them is mutated, at which point
//! the mutating side forks a private copy (or rewrites in place when it is
//! the only owner). Content lives in the narrowest of two encodings, single
//! byte (Latin-1 values) or wide (`char`), and every value can additionally
//! be read as UTF-8 through a cached projection. Released cells of common
//! sizes are parked in a thread-local pool ([`pool`]) and revived by later
//! allocations of the same size.
//!
//! ```
//! use polytext::{Encoding, Text};
//!
//! let mut s = Text::from("Mini");
//! let snapshot = s.clone();
//! s += " Me";
//! assert_eq!(s, "Mini Me");
//! assert_eq!(s.len(), 7);
//! assert_eq!(snapshot, "Mini");
//! assert_eq!(s.encoding(), Encoding::SingleByte);
//!
//! s.push('\u{4e2d}');
//! assert_eq!(s.encoding(), Encoding::Wide);
//! assert_eq!(s.len(), 8);
//! s.with_utf8(|u| assert_eq!(u, "Mini Me\u{4e2d}"));
//! ```

#![cfg_attr(feature = "unstable", feature(test))]

mod buffer;
mod float_parse;
pub mod pool;
mod text;
pub mod utf8;

pub use crate::buffer::Encoding;
pub use crate::pool::PoolStats;
pub use crate::text::Text;
