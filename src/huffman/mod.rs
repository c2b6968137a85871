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

//! Huffman decoding of string literals.
//!
//! String literals in a header block may be coded with the static Huffman
//! code. The code was generated from statistics obtained on a large sample
//! of HTTP headers; it is a canonical Huffman code with some tweaking to
//! ensure that no symbol has a unique code length.
//!
//! A coded string is padded to the next octet boundary with the most
//! significant bits of the EOS symbol. The decoder rejects input in which
//! the EOS symbol itself appears, input whose padding is longer than seven
//! bits, and padding that is not the EOS prefix.

mod consts;

use std::sync::OnceLock;

use consts::HUFFMAN_CODES;

/// The end-of-string symbol. It only terminates strings and must never be
/// produced by a decode.
const EOS: u16 = 256;

/// One node of the decode tree. Slot 0 is the root; a child index of 0 marks
/// an absent child.
#[derive(Clone, Copy)]
enum Node {
    Internal { left: u16, right: u16 },
    Leaf { symbol: u16 },
}

fn decode_tree() -> &'static [Node] {
    static TREE: OnceLock<Vec<Node>> = OnceLock::new();
    TREE.get_or_init(build_decode_tree).as_slice()
}

/// Expands the code table into a binary tree walked bit by bit.
fn build_decode_tree() -> Vec<Node> {
    let mut nodes = vec![Node::Internal { left: 0, right: 0 }];
    for (symbol, &(code, bits)) in HUFFMAN_CODES.iter().enumerate() {
        let mut index = 0usize;
        for position in (0..bits).rev() {
            let bit = (code >> position) & 1;
            let child = match nodes[index] {
                Node::Internal { left, right } => {
                    if bit == 0 {
                        left
                    } else {
                        right
                    }
                }
                // The code is prefix-free, so no code passes through a leaf.
                Node::Leaf { .. } => unreachable!(),
            };
            if child == 0 {
                let next = nodes.len() as u16;
                nodes.push(if position == 0 {
                    Node::Leaf {
                        symbol: symbol as u16,
                    }
                } else {
                    Node::Internal { left: 0, right: 0 }
                });
                if let Node::Internal { left, right } = &mut nodes[index] {
                    if bit == 0 {
                        *left = next;
                    } else {
                        *right = next;
                    }
                }
                index = next as usize;
            } else {
                index = child as usize;
            }
        }
    }
    nodes
}

/// Decoder for Huffman-coded string literals.
///
/// A connection endpoint holds one decoder per traffic direction; both
/// directions resolve to the canonical code table.
pub(crate) struct HuffmanDecoder {
    tree: &'static [Node],
}

impl HuffmanDecoder {
    /// Creates the decoder for the request direction, used by servers.
    pub(crate) fn request() -> Self {
        Self {
            tree: decode_tree(),
        }
    }

    /// Creates the decoder for the response direction, used by clients.
    pub(crate) fn response() -> Self {
        Self {
            tree: decode_tree(),
        }
    }

    /// Converts a Huffman-coded byte sequence into the literal octets.
    pub(crate) fn decode(&self, src: &[u8]) -> Result<Vec<u8>, HuffmanDecodeError> {
        let mut dst = Vec::with_capacity(src.len() * 8 / 5);
        let mut index = 0u16;
        // Bits consumed since the last decoded symbol, and whether they were
        // all ones. A trailing partial symbol is only valid as an EOS prefix
        // of at most seven bits.
        let mut pending = 0u8;
        let mut pending_ones = true;
        for byte in src.iter() {
            for position in (0..8).rev() {
                let bit = (byte >> position) & 1;
                index = match self.tree[index as usize] {
                    Node::Internal { left, right } => {
                        if bit == 0 {
                            left
                        } else {
                            right
                        }
                    }
                    Node::Leaf { .. } => unreachable!(),
                };
                if index == 0 {
                    return Err(HuffmanDecodeError::InvalidHuffmanCode);
                }
                pending += 1;
                pending_ones &= bit == 1;
                if let Node::Leaf { symbol } = self.tree[index as usize] {
                    if symbol == EOS {
                        return Err(HuffmanDecodeError::InvalidHuffmanCode);
                    }
                    dst.push(symbol as u8);
                    index = 0;
                    pending = 0;
                    pending_ones = true;
                }
            }
        }
        if index != 0 && (pending > 7 || !pending_ones) {
            return Err(HuffmanDecodeError::InvalidHuffmanCode);
        }
        Ok(dst)
    }
}

/// Possible errors in Huffman decoding operations.
#[derive(Debug, Eq, PartialEq)]
pub(crate) enum HuffmanDecodeError {
    InvalidHuffmanCode,
}

#[cfg(test)]
mod ut_huffman {
    use super::{HuffmanDecodeError, HuffmanDecoder};
    use crate::util::test_util::decode;

    /// UT test cases for `HuffmanDecoder::decode`.
    ///
    /// # Brief
    /// 1. Creates a `HuffmanDecoder`.
    /// 2. Calls `HuffmanDecoder::decode()` on known coded strings.
    /// 3. Checks if the test results are correct.
    #[test]
    fn ut_huffman_decode() {
        rfc7541_test_cases();

        macro_rules! huffman_test_case {
            ($input: literal, $expected: literal $(,)?) => {
                let src = decode($input).unwrap();
                let decoder = HuffmanDecoder::request();
                match decoder.decode(src.as_slice()) {
                    Ok(octets) => assert_eq!(octets.as_slice(), $expected.as_bytes()),
                    _ => panic!("HuffmanDecoder::decode() failed!"),
                }
            };
        }

        /// The following coded strings are from RFC7541.
        fn rfc7541_test_cases() {
            huffman_test_case!("f1e3c2e5f23a6ba0ab90f4ff", "www.example.com");
            huffman_test_case!("a8eb10649cbf", "no-cache");
            huffman_test_case!("25a849e95ba97d7f", "custom-key");
            huffman_test_case!("25a849e95bb8e8b4bf", "custom-value");
            huffman_test_case!("6402", "302");
            huffman_test_case!("9bd9ab", "gzip");
        }
    }

    /// UT test cases for `HuffmanDecoder::decode` error handling.
    ///
    /// # Brief
    /// 1. Calls `HuffmanDecoder::decode()` on inputs with the EOS symbol,
    ///    over-long padding and padding that is not the EOS prefix.
    /// 2. Checks that every decode fails.
    #[test]
    fn ut_huffman_decode_invalid() {
        let decoder = HuffmanDecoder::response();

        // 32 one-bits contain the 30-bit EOS symbol.
        assert_eq!(
            decoder.decode(&[0xff, 0xff, 0xff, 0xff]),
            Err(HuffmanDecodeError::InvalidHuffmanCode)
        );

        // A whole byte of ones is 8 bits of padding, one too many.
        assert_eq!(
            decoder.decode(&[0xff]),
            Err(HuffmanDecodeError::InvalidHuffmanCode)
        );

        // "0" followed by three zero bits is not an EOS prefix.
        assert_eq!(
            decoder.decode(&[0x00]),
            Err(HuffmanDecodeError::InvalidHuffmanCode)
        );
    }

    /// UT test cases for `HuffmanDecoder::decode` boundaries.
    ///
    /// # Brief
    /// 1. Decodes an empty input and a single symbol with valid padding.
    /// 2. Checks the results.
    #[test]
    fn ut_huffman_decode_boundary() {
        let decoder = HuffmanDecoder::request();
        assert_eq!(decoder.decode(&[]), Ok(Vec::new()));

        // 'a' is the 5-bit code 00011, padded with three ones.
        assert_eq!(decoder.decode(&[0x1f]), Ok(b"a".to_vec()));
    }
}
