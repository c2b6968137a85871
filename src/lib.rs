// Copyright (c) 2023 Huawei Device Co., Ltd.
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! `ylong_hpack` provides the receive side of HPACK header block
//! compression for HTTP/2 endpoints: a streaming decoder that reconstructs
//! header fields from the compressed byte stream of a connection.
//!
//! # Introduction
//! HPACK compresses header fields by letting the encoder reference a static
//! table of common fields and a per-connection dynamic table of previously
//! transmitted fields, instead of repeating the field octets. The dynamic
//! table and the reference set layered on it are shared state between the
//! two endpoints of a connection, so a decoder instance must see every
//! header block of its connection, in order.
//!
//! The decoder is incremental: header blocks can be fed in chunks of any
//! size, and decoding suspends and resumes at arbitrary byte boundaries.
//! Decoded fields are delivered to a [`HeaderListener`] in wire order.
//!
//! # Examples
//! ```
//! use ylong_hpack::Decoder;
//!
//! let mut decoder = Decoder::new(true, 8192);
//! let mut fields = Vec::new();
//! let mut listener = |name: &[u8], value: &[u8]| {
//!     fields.push((name.to_vec(), value.to_vec()));
//! };
//!
//! // An indexed header field referencing ":method: GET".
//! decoder.decode(&[0x82], &mut listener).unwrap();
//! let truncated = decoder.end_header_block(&mut listener);
//!
//! assert!(!truncated);
//! assert_eq!(fields.len(), 1);
//! ```

mod decoder;
mod error;
mod huffman;
mod integer;
mod table;

#[cfg(test)]
pub(crate) mod util;

pub use decoder::{Decoder, HeaderListener, DEFAULT_HEADER_TABLE_SIZE};
pub use error::DecompressionError;
pub use table::{DynamicTable, HeaderEntry, StaticTable, HEADER_ENTRY_OVERHEAD};
