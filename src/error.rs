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

//! Errors raised while decompressing a header block.
//!
//! Every variant is fatal for the connection: the compression state shared
//! with the peer encoder can no longer be trusted, so the decoder instance
//! must be discarded after any of them is returned.
//!
//! Short input is never an error. When a `decode` call runs out of bytes in
//! the middle of a representation it suspends and resumes on the next call.

use std::fmt;

/// The header block decompression failure type.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum DecompressionError {
    /// A prefix integer does not fit the 32-bit value budget, either in its
    /// continuation bytes or in the final prefix addition.
    IntegerOverflow,

    /// A literal header name of length zero. Empty names cannot be
    /// represented in the HTTP/1.x mapping.
    EmptyHeaderName,

    /// An index beyond the combined range of the dynamic and static tables.
    IndexOutOfBounds,

    /// A Huffman-coded string literal could not be decoded.
    InvalidHuffmanCode,
}

impl fmt::Display for DecompressionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IntegerOverflow => write!(f, "prefix integer overflow"),
            Self::EmptyHeaderName => write!(f, "empty header name"),
            Self::IndexOutOfBounds => write!(f, "header index out of bounds"),
            Self::InvalidHuffmanCode => write!(f, "invalid huffman code"),
        }
    }
}

impl std::error::Error for DecompressionError {}

#[cfg(test)]
mod ut_error {
    use super::DecompressionError;

    /// UT test cases for `DecompressionError` formatting.
    ///
    /// # Brief
    /// 1. Formats every `DecompressionError` variant.
    /// 2. Checks that each message is distinct and non-empty.
    #[test]
    fn ut_error_display() {
        let errors = [
            DecompressionError::IntegerOverflow,
            DecompressionError::EmptyHeaderName,
            DecompressionError::IndexOutOfBounds,
            DecompressionError::InvalidHuffmanCode,
        ];
        for (n, err) in errors.iter().enumerate() {
            let msg = format!("{err}");
            assert!(!msg.is_empty());
            for other in errors.iter().skip(n + 1) {
                assert_ne!(msg, format!("{other}"));
            }
        }
    }
}
