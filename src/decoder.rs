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

//! Header block decoding.
//!
//! The decoder consumes the compressed byte stream of one header block at a
//! time and emits the reconstructed header fields to a listener. Two wire
//! representations exist:
//!
//! - An *indexed* representation references a table entry and toggles it in
//!   or out of the reference set; a dynamic entry entering the set is
//!   emitted, a static entry is copied into the dynamic table and emitted.
//!   Index zero clears the whole reference set.
//! - A *literal* representation carries an inline value and either an inline
//!   or an indexed name, and optionally adds the field to the dynamic table.
//!
//! ```text
//!   0   1   2   3   4   5   6   7
//! +---+---+---+---+---+---+---+---+
//! | 1 |        Index (7+)         |  Indexed Header Field
//! +---+---------------------------+
//! | 0 | 1 |  Name Index (6+)      |  Literal Header Field without Indexing
//! +---+---+-----------------------+
//! | 0 | 0 |  Name Index (6+)      |  Literal Header Field with
//! +---+---+-----------------------+  Incremental Indexing
//! ```
//!
//! Entries left in the reference set at the end of a header block belong to
//! the block implicitly: `end_header_block` emits every member that was not
//! already emitted while decoding.
//!
//! Decoding is resumable at any byte boundary. Every time the input runs
//! out, the current state is saved and the next `decode` call continues from
//! it, so callers can feed a header block in arbitrary chunks.

use core::cmp::Ordering;

use crate::error::DecompressionError;
use crate::huffman::HuffmanDecoder;
use crate::integer::IntegerDecoder;
use crate::table::{DynamicTable, HeaderEntry, StaticTable, HEADER_ENTRY_OVERHEAD};

/// The dynamic table capacity applied when the peer does not negotiate one.
pub const DEFAULT_HEADER_TABLE_SIZE: usize = 4096;

/// Receiver of the decoded header fields.
///
/// Called synchronously from inside [`Decoder::decode`] and
/// [`Decoder::end_header_block`], once per emitted field, in wire order. The
/// octet slices borrow from the decoder state and are only valid for the
/// duration of the call.
pub trait HeaderListener {
    /// Called once for every decoded header field.
    fn emit_header(&mut self, name: &[u8], value: &[u8]);
}

impl<F> HeaderListener for F
where
    F: FnMut(&[u8], &[u8]),
{
    fn emit_header(&mut self, name: &[u8], value: &[u8]) {
        self(name, value)
    }
}

/// Whether a literal representation adds its field to the dynamic table.
#[derive(Clone, Copy, PartialEq, Eq)]
enum IndexType {
    None,
    Incremental,
}

/// Decoder for the header blocks of one connection.
///
/// A decoder owns the connection's compression state: the dynamic table with
/// its reference-set flags, and the state machine of the representation
/// currently in flight. Feed compressed bytes with [`Decoder::decode`] and
/// finish each block with [`Decoder::end_header_block`].
///
/// Emissions that would push the block past `max_header_size` are silently
/// dropped; `end_header_block` reports whether that happened. A
/// [`DecompressionError`] leaves the decoder in an undefined state and the
/// instance must be discarded.
pub struct Decoder {
    table: DynamicTable,
    huffman: HuffmanDecoder,
    max_header_size: usize,
    header_size: usize,
    state: Option<DecodeState>,
}

impl Decoder {
    /// Creates a `Decoder` with the default dynamic table capacity.
    /// `is_server` selects the request direction for string decoding, the
    /// direction servers receive.
    pub fn new(is_server: bool, max_header_size: usize) -> Self {
        Self::with_table_size(is_server, max_header_size, DEFAULT_HEADER_TABLE_SIZE)
    }

    /// Creates a `Decoder` with the given dynamic table capacity.
    pub fn with_table_size(
        is_server: bool,
        max_header_size: usize,
        max_header_table_size: usize,
    ) -> Self {
        Self {
            table: DynamicTable::with_capacity(max_header_table_size),
            huffman: if is_server {
                HuffmanDecoder::request()
            } else {
                HuffmanDecoder::response()
            },
            max_header_size,
            header_size: 0,
            state: None,
        }
    }

    /// Decodes a chunk of the current header block. Callers can split a
    /// block into chunks of any size; a representation cut off by the end of
    /// the chunk resumes on the next call.
    pub fn decode<L: HeaderListener>(
        &mut self,
        buf: &[u8],
        listener: &mut L,
    ) -> Result<(), DecompressionError> {
        let mut buf = buf;
        let mut updater = Updater {
            table: &mut self.table,
            huffman: &self.huffman,
            header_size: &mut self.header_size,
            max_header_size: self.max_header_size,
            listener,
        };
        let mut state = self
            .state
            .take()
            .unwrap_or_else(|| ReprFirstByte.into());
        loop {
            match state.decode(&mut buf, &mut updater) {
                // A complete representation was applied; start the next one.
                DecResult::Decoded => state = ReprFirstByte.into(),
                // The chunk is used up. Save the state for the next call.
                DecResult::NeedMore(next) => {
                    self.state = Some(next);
                    return Ok(());
                }
                DecResult::Error(e) => return Err(e),
            }
        }
    }

    /// Finishes the current header block. Every reference-set entry that was
    /// not emitted while decoding is emitted now, newest first. Returns
    /// whether any header field of the block was dropped or truncated
    /// because the block exceeded `max_header_size`.
    pub fn end_header_block<L: HeaderListener>(&mut self, listener: &mut L) -> bool {
        for entry in self.table.entries_mut() {
            if entry.in_reference_set && !entry.emitted {
                emit_header(
                    listener,
                    &mut self.header_size,
                    self.max_header_size,
                    entry.name(),
                    entry.value(),
                );
            }
            entry.emitted = false;
        }
        let truncated = self.header_size > self.max_header_size;
        self.header_size = 0;
        self.state = None;
        truncated
    }

    /// The dynamic table of the connection.
    pub fn table(&self) -> &DynamicTable {
        &self.table
    }
}

/// Emits one header field to the listener unless it would push the block
/// past `max_header_size`; a suppressed emission pins the block size above
/// the limit so `end_header_block` reports the truncation.
fn emit_header<L: HeaderListener>(
    listener: &mut L,
    header_size: &mut usize,
    max_header_size: usize,
    name: &[u8],
    value: &[u8],
) {
    let new_size = *header_size + name.len() + value.len();
    if new_size <= max_header_size {
        listener.emit_header(name, value);
        *header_size = new_size;
    } else {
        // The truncation is reported during end_header_block.
        *header_size = max_header_size + 1;
    }
}

/// `Updater` applies decoded representations to the connection state: it
/// resolves indexes, maintains the reference set, updates the dynamic table
/// and emits header fields.
struct Updater<'a, L: HeaderListener> {
    table: &'a mut DynamicTable,
    huffman: &'a HuffmanDecoder,
    header_size: &'a mut usize,
    max_header_size: usize,
    listener: &'a mut L,
}

impl<L: HeaderListener> Updater<'_, L> {
    /// Removes every dynamic entry from the reference set. The entries
    /// themselves stay in the table.
    fn clear_reference_set(&mut self) {
        for entry in self.table.entries_mut() {
            entry.in_reference_set = false;
        }
    }

    /// Toggles the entry at the combined index. A dynamic entry flips its
    /// reference-set membership, emitting when it enters the set. A static
    /// entry is always copied into the dynamic table as a fresh entry.
    fn toggle_index(&mut self, index: usize) -> Result<(), DecompressionError> {
        let length = self.table.length();
        if let Some(entry) = self.table.get_entry_mut(index) {
            if entry.in_reference_set {
                entry.in_reference_set = false;
            } else {
                entry.in_reference_set = true;
                entry.emitted = true;
                emit_header(
                    self.listener,
                    self.header_size,
                    self.max_header_size,
                    entry.name(),
                    entry.value(),
                );
            }
            Ok(())
        } else if index > length && index - length <= StaticTable::LENGTH {
            let (name, value) = StaticTable::entry(index - length);
            self.insert_header(name.to_vec(), value.to_vec(), IndexType::Incremental);
            Ok(())
        } else {
            Err(DecompressionError::IndexOutOfBounds)
        }
    }

    /// Resolves the name of a literal representation with an indexed name.
    fn read_name(&self, index: usize) -> Result<Vec<u8>, DecompressionError> {
        let length = self.table.length();
        if let Some(entry) = self.table.get_entry(index) {
            Ok(entry.name().to_vec())
        } else if index > length && index - length <= StaticTable::LENGTH {
            Ok(StaticTable::entry(index - length).0.to_vec())
        } else {
            Err(DecompressionError::IndexOutOfBounds)
        }
    }

    /// Emits a completed header field and, for incremental indexing, inserts
    /// it into the dynamic table as a reference-set member.
    fn insert_header(&mut self, name: Vec<u8>, value: Vec<u8>, index_type: IndexType) {
        emit_header(
            self.listener,
            self.header_size,
            self.max_header_size,
            &name,
            &value,
        );
        if index_type == IndexType::Incremental {
            let mut entry = HeaderEntry::new(name, value);
            entry.in_reference_set = true;
            entry.emitted = true;
            self.table.add(entry);
        }
    }

    /// Checks a projected field size against the block limit, pinning the
    /// block size above the limit when it does not fit.
    fn exceeds_max_header_size(&mut self, size: usize) -> bool {
        if size + *self.header_size <= self.max_header_size {
            return false;
        }
        // The truncation is reported during end_header_block.
        *self.header_size = self.max_header_size + 1;
        true
    }
}

macro_rules! state_def {
    ($name: ident, $($state: ident),* $(,)?) => {
        enum $name {
            $(
                $state($state),
            )*
        }

        impl $name {
            fn decode<L: HeaderListener>(
                self,
                buf: &mut &[u8],
                updater: &mut Updater<'_, L>,
            ) -> DecResult {
                match self {
                    $(
                        Self::$state(state) => state.decode(buf, updater),
                    )*
                }
            }
        }

        $(
            impl From<$state> for $name {
                fn from(s: $state) -> Self {
                    Self::$state(s)
                }
            }
        )*
    }
}

// Representation decoding state diagram:
//
// `ReprFirstByte` ┬ `IndexedTrailing`
//                 ├ `NameIndexTrailing`   ──────────────┐
//                 ├ `NameLengthFirstByte` ┬ `NameBytes` ┼ `ValueLengthFirstByte`
//                 │   └ `NameLengthTrailing`            │   └ `ValueLengthTrailing`
//                 │       └ `SkipNameBytes` ────────────┤
//                 └───────────────────────────────────> ┼ `ValueBytes`
//                                                       └ `SkipValueBytes`
state_def!(
    DecodeState,
    ReprFirstByte,
    IndexedTrailing,
    NameIndexTrailing,
    NameLengthFirstByte,
    NameLengthTrailing,
    NameBytes,
    SkipNameBytes,
    ValueLengthFirstByte,
    ValueLengthTrailing,
    ValueBytes,
    SkipValueBytes,
);

/// Decoder's possible returns during the decoding process.
enum DecResult {
    /// A complete representation was consumed and applied.
    Decoded,

    /// More bytes are needed. Holds the state to resume from.
    NeedMore(DecodeState),

    /// Errors that may occur when decoding.
    Error(DecompressionError),
}

impl From<DecompressionError> for DecResult {
    fn from(e: DecompressionError) -> Self {
        DecResult::Error(e)
    }
}

/// The idle state. One byte selects the representation.
struct ReprFirstByte;

impl ReprFirstByte {
    fn decode<L: HeaderListener>(
        self,
        buf: &mut &[u8],
        updater: &mut Updater<'_, L>,
    ) -> DecResult {
        if buf.is_empty() {
            return DecResult::NeedMore(self.into());
        }
        let byte = buf[0];
        *buf = &buf[1..];
        if byte & 0x80 == 0x80 {
            // Indexed representation with a 7-bit index.
            match IntegerDecoder::first_byte(byte, 0x7f) {
                Ok(0) => {
                    updater.clear_reference_set();
                    DecResult::Decoded
                }
                Ok(index) => match updater.toggle_index(index) {
                    Ok(()) => DecResult::Decoded,
                    Err(e) => e.into(),
                },
                Err(index) => IndexedTrailing { index }.decode(buf, updater),
            }
        } else {
            // Literal representation. The 0x40 bit marks "do not index".
            let index_type = if byte & 0x40 == 0x40 {
                IndexType::None
            } else {
                IndexType::Incremental
            };
            match IntegerDecoder::first_byte(byte, 0x3f) {
                // Name index zero means the name follows as a literal.
                Ok(0) => NameLengthFirstByte { index_type }.decode(buf, updater),
                Ok(index) => match updater.read_name(index) {
                    Ok(name) => ValueLengthFirstByte {
                        index_type,
                        name_length: name.len(),
                        name,
                    }
                    .decode(buf, updater),
                    Err(e) => e.into(),
                },
                Err(index) => NameIndexTrailing { index_type, index }.decode(buf, updater),
            }
        }
    }
}

/// Continuation of an indexed header whose 7-bit prefix was the escape
/// value.
struct IndexedTrailing {
    index: IntegerDecoder,
}

impl IndexedTrailing {
    fn decode<L: HeaderListener>(
        mut self,
        buf: &mut &[u8],
        updater: &mut Updater<'_, L>,
    ) -> DecResult {
        loop {
            if buf.is_empty() {
                return DecResult::NeedMore(self.into());
            }
            let byte = buf[0];
            *buf = &buf[1..];
            match self.index.next_byte(byte) {
                Ok(None) => {}
                Ok(Some(index)) => {
                    return match updater.toggle_index(index) {
                        Ok(()) => DecResult::Decoded,
                        Err(e) => e.into(),
                    }
                }
                Err(e) => return e.into(),
            }
        }
    }
}

/// Continuation of a literal whose 6-bit name index was the escape value.
struct NameIndexTrailing {
    index_type: IndexType,
    index: IntegerDecoder,
}

impl NameIndexTrailing {
    fn decode<L: HeaderListener>(
        mut self,
        buf: &mut &[u8],
        updater: &mut Updater<'_, L>,
    ) -> DecResult {
        loop {
            if buf.is_empty() {
                return DecResult::NeedMore(self.into());
            }
            let byte = buf[0];
            *buf = &buf[1..];
            match self.index.next_byte(byte) {
                Ok(None) => {}
                Ok(Some(index)) => {
                    return match updater.read_name(index) {
                        Ok(name) => ValueLengthFirstByte {
                            index_type: self.index_type,
                            name_length: name.len(),
                            name,
                        }
                        .decode(buf, updater),
                        Err(e) => e.into(),
                    }
                }
                Err(e) => return e.into(),
            }
        }
    }
}

/// First byte of a literal name length: the Huffman flag and a 7-bit length
/// prefix.
struct NameLengthFirstByte {
    index_type: IndexType,
}

impl NameLengthFirstByte {
    fn decode<L: HeaderListener>(
        self,
        buf: &mut &[u8],
        updater: &mut Updater<'_, L>,
    ) -> DecResult {
        if buf.is_empty() {
            return DecResult::NeedMore(self.into());
        }
        let byte = buf[0];
        *buf = &buf[1..];
        let huffman = byte & 0x80 == 0x80;
        match IntegerDecoder::first_byte(byte, 0x7f) {
            Ok(length) => on_name_length(self.index_type, huffman, length, buf, updater),
            Err(length) => NameLengthTrailing {
                index_type: self.index_type,
                huffman,
                length,
            }
            .decode(buf, updater),
        }
    }
}

/// ULE128 continuation of a literal name length.
struct NameLengthTrailing {
    index_type: IndexType,
    huffman: bool,
    length: IntegerDecoder,
}

impl NameLengthTrailing {
    fn decode<L: HeaderListener>(
        mut self,
        buf: &mut &[u8],
        updater: &mut Updater<'_, L>,
    ) -> DecResult {
        loop {
            if buf.is_empty() {
                return DecResult::NeedMore(self.into());
            }
            let byte = buf[0];
            *buf = &buf[1..];
            match self.length.next_byte(byte) {
                Ok(None) => {}
                Ok(Some(length)) => {
                    return on_name_length(self.index_type, self.huffman, length, buf, updater)
                }
                Err(e) => return e.into(),
            }
        }
    }
}

/// Applies the size rules once a literal name length is known.
fn on_name_length<L: HeaderListener>(
    index_type: IndexType,
    huffman: bool,
    length: usize,
    buf: &mut &[u8],
    updater: &mut Updater<'_, L>,
) -> DecResult {
    // Empty names cannot be represented in the HTTP/1.x mapping.
    if length == 0 {
        return DecompressionError::EmptyHeaderName.into();
    }
    if updater.exceeds_max_header_size(length) {
        if index_type == IndexType::None {
            // The name is unused, so its bytes are dropped unread.
            return SkipNameBytes {
                index_type,
                length,
                skip: length,
            }
            .decode(buf, updater);
        }
        if length + HEADER_ENTRY_OVERHEAD > updater.table.capacity() {
            // The entry can never fit the table either. The whole
            // representation is unusable.
            updater.table.clear();
            return SkipNameBytes {
                index_type,
                length,
                skip: length,
            }
            .decode(buf, updater);
        }
    }
    NameBytes {
        index_type,
        huffman,
        length,
        octets: Vec::new(),
    }
    .decode(buf, updater)
}

/// Accumulates the octets of a literal name.
struct NameBytes {
    index_type: IndexType,
    huffman: bool,
    length: usize,
    octets: Vec<u8>,
}

impl NameBytes {
    fn decode<L: HeaderListener>(
        mut self,
        buf: &mut &[u8],
        updater: &mut Updater<'_, L>,
    ) -> DecResult {
        match (buf.len() + self.octets.len()).cmp(&self.length) {
            Ordering::Greater | Ordering::Equal => {
                let pos = self.length - self.octets.len();
                self.octets.extend_from_slice(&buf[..pos]);
                *buf = &buf[pos..];
                let name = if self.huffman {
                    match updater.huffman.decode(&self.octets) {
                        Ok(octets) => octets,
                        Err(_) => return DecompressionError::InvalidHuffmanCode.into(),
                    }
                } else {
                    self.octets
                };
                ValueLengthFirstByte {
                    index_type: self.index_type,
                    name_length: name.len(),
                    name,
                }
                .decode(buf, updater)
            }
            Ordering::Less => {
                self.octets.extend_from_slice(buf);
                *buf = &buf[buf.len()..];
                DecResult::NeedMore(self.into())
            }
        }
    }
}

/// Drains the octets of a name that will not be used.
struct SkipNameBytes {
    index_type: IndexType,
    length: usize,
    skip: usize,
}

impl SkipNameBytes {
    fn decode<L: HeaderListener>(
        mut self,
        buf: &mut &[u8],
        updater: &mut Updater<'_, L>,
    ) -> DecResult {
        let n = self.skip.min(buf.len());
        *buf = &buf[n..];
        self.skip -= n;
        if self.skip == 0 {
            // The pending name stays empty but its length still counts
            // toward the field size, so the value stage always skips as
            // well and the representation is dropped whole.
            ValueLengthFirstByte {
                index_type: self.index_type,
                name_length: self.length,
                name: Vec::new(),
            }
            .decode(buf, updater)
        } else {
            DecResult::NeedMore(self.into())
        }
    }
}

/// First byte of a literal value length: the Huffman flag and a 7-bit
/// length prefix.
struct ValueLengthFirstByte {
    index_type: IndexType,
    name: Vec<u8>,
    name_length: usize,
}

impl ValueLengthFirstByte {
    fn decode<L: HeaderListener>(
        self,
        buf: &mut &[u8],
        updater: &mut Updater<'_, L>,
    ) -> DecResult {
        if buf.is_empty() {
            return DecResult::NeedMore(self.into());
        }
        let byte = buf[0];
        *buf = &buf[1..];
        let huffman = byte & 0x80 == 0x80;
        match IntegerDecoder::first_byte(byte, 0x7f) {
            Ok(length) => on_value_length(
                self.index_type,
                huffman,
                self.name,
                self.name_length,
                length,
                buf,
                updater,
            ),
            Err(length) => ValueLengthTrailing {
                index_type: self.index_type,
                name: self.name,
                name_length: self.name_length,
                huffman,
                length,
            }
            .decode(buf, updater),
        }
    }
}

/// ULE128 continuation of a literal value length.
struct ValueLengthTrailing {
    index_type: IndexType,
    name: Vec<u8>,
    name_length: usize,
    huffman: bool,
    length: IntegerDecoder,
}

impl ValueLengthTrailing {
    fn decode<L: HeaderListener>(
        mut self,
        buf: &mut &[u8],
        updater: &mut Updater<'_, L>,
    ) -> DecResult {
        loop {
            if buf.is_empty() {
                return DecResult::NeedMore(self.into());
            }
            let byte = buf[0];
            *buf = &buf[1..];
            match self.length.next_byte(byte) {
                Ok(None) => {}
                Ok(Some(length)) => {
                    return on_value_length(
                        self.index_type,
                        self.huffman,
                        self.name,
                        self.name_length,
                        length,
                        buf,
                        updater,
                    )
                }
                Err(e) => return e.into(),
            }
        }
    }
}

/// Applies the size rules once a literal value length is known. The name
/// length is accounted separately: a skipped name is empty but still counts.
fn on_value_length<L: HeaderListener>(
    index_type: IndexType,
    huffman: bool,
    name: Vec<u8>,
    name_length: usize,
    length: usize,
    buf: &mut &[u8],
    updater: &mut Updater<'_, L>,
) -> DecResult {
    let new_header_size = name_length + length;
    if updater.exceeds_max_header_size(new_header_size) {
        if index_type == IndexType::None {
            // The value is unused, so its bytes are dropped unread.
            return SkipValueBytes { skip: length }.decode(buf, updater);
        }
        if new_header_size + HEADER_ENTRY_OVERHEAD > updater.table.capacity() {
            // The entry can never fit the table either. The whole
            // representation is unusable.
            updater.table.clear();
            return SkipValueBytes { skip: length }.decode(buf, updater);
        }
    }
    if length == 0 {
        updater.insert_header(name, Vec::new(), index_type);
        return DecResult::Decoded;
    }
    ValueBytes {
        index_type,
        huffman,
        name,
        length,
        octets: Vec::new(),
    }
    .decode(buf, updater)
}

/// Accumulates the octets of a literal value, then completes the field.
struct ValueBytes {
    index_type: IndexType,
    huffman: bool,
    name: Vec<u8>,
    length: usize,
    octets: Vec<u8>,
}

impl ValueBytes {
    fn decode<L: HeaderListener>(
        mut self,
        buf: &mut &[u8],
        updater: &mut Updater<'_, L>,
    ) -> DecResult {
        match (buf.len() + self.octets.len()).cmp(&self.length) {
            Ordering::Greater | Ordering::Equal => {
                let pos = self.length - self.octets.len();
                self.octets.extend_from_slice(&buf[..pos]);
                *buf = &buf[pos..];
                let value = if self.huffman {
                    match updater.huffman.decode(&self.octets) {
                        Ok(octets) => octets,
                        Err(_) => return DecompressionError::InvalidHuffmanCode.into(),
                    }
                } else {
                    self.octets
                };
                updater.insert_header(self.name, value, self.index_type);
                DecResult::Decoded
            }
            Ordering::Less => {
                self.octets.extend_from_slice(buf);
                *buf = &buf[buf.len()..];
                DecResult::NeedMore(self.into())
            }
        }
    }
}

/// Drains the octets of a value that will not be used.
struct SkipValueBytes {
    skip: usize,
}

impl SkipValueBytes {
    fn decode<L: HeaderListener>(
        mut self,
        buf: &mut &[u8],
        _updater: &mut Updater<'_, L>,
    ) -> DecResult {
        let n = self.skip.min(buf.len());
        *buf = &buf[n..];
        self.skip -= n;
        if self.skip == 0 {
            DecResult::Decoded
        } else {
            DecResult::NeedMore(self.into())
        }
    }
}
