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

//! Prefix integer decoding.
//!
//! Integers represent header field indexes and string lengths. An integer
//! starts inside the first byte of a representation, masked to the prefix
//! width of that representation. A prefix below the all-ones escape value is
//! the whole integer; the escape value is followed by ULE128 continuation
//! bytes whose low 7 bits accumulate at shifts 0, 7, 14, 21 and 28, and
//! whose decoded value is added to the prefix.
//!
//! # Pseudocode
//! ```text
//! decode I from the next N bits
//! if I < 2^N - 1, return I
//! else
//!     M = 0
//!     repeat
//!         B = next octet
//!         I = I + (B & 127) * 2^M
//!         M = M + 7
//!     while B & 128 == 128
//!     return I
//! ```

use core::cmp::Ordering;

use crate::error::DecompressionError;

/// `IntegerDecoder` decodes one prefix integer, suspending between bytes.
///
/// The decoded value is bounded to the signed 32-bit range: a continuation
/// byte that would shift bits past position 31, and a final sum above
/// `i32::MAX`, are both decompression failures.
pub(crate) struct IntegerDecoder {
    prefix: usize,
    value: usize,
    shift: u32,
}

impl IntegerDecoder {
    /// Calculates an integer based on the incoming first byte and mask.
    /// If the prefix is below the escape value the result is returned
    /// directly, otherwise the continuation decoder itself is returned.
    pub(crate) fn first_byte(byte: u8, mask: u8) -> Result<usize, Self> {
        let prefix = byte & mask;
        match prefix.cmp(&mask) {
            Ordering::Less => Ok(prefix as usize),
            _ => Err(Self {
                prefix: prefix as usize,
                value: 0,
                shift: 0,
            }),
        }
    }

    /// Continues computing the integer based on the next byte of the input.
    /// Returns `Ok(Some(index))` if the result is obtained, otherwise returns
    /// `Ok(None)`, and returns `Err` in case of overflow.
    pub(crate) fn next_byte(&mut self, byte: u8) -> Result<Option<usize>, DecompressionError> {
        // Bits at position 31 and above would exceed the 32-bit value budget.
        if self.shift == 28 && (byte & 0xf8) != 0 {
            return Err(DecompressionError::IntegerOverflow);
        }
        self.value |= ((byte & 0x7f) as usize) << self.shift;
        self.shift += 7;
        if (byte & 0x80) == 0x80 {
            return Ok(None);
        }
        let index = self.prefix + self.value;
        if index > i32::MAX as usize {
            return Err(DecompressionError::IntegerOverflow);
        }
        Ok(Some(index))
    }
}

#[cfg(test)]
mod ut_integer {
    use crate::error::DecompressionError;
    use crate::integer::IntegerDecoder;

    /// UT test cases for `IntegerDecoder`.
    ///
    /// # Brief
    /// 1. Calls `IntegerDecoder::first_byte()` and
    ///    `IntegerDecoder::next_byte()`, passing in the specified parameters.
    /// 2. Checks if the test results are correct.
    #[test]
    fn ut_integer_decode() {
        rfc7541_test_cases();

        macro_rules! integer_test_case {
            ($fb: literal, $mask: literal => $fb_res: expr) => {
                match IntegerDecoder::first_byte($fb, $mask) {
                    Ok(idx) => assert_eq!(idx, $fb_res),
                    _ => panic!("IntegerDecoder::first_byte() failed!"),
                }
            };
            ($fb: literal, $mask: literal $(, $nb: literal => $nb_res: expr)* $(,)?) => {
                match IntegerDecoder::first_byte($fb, $mask) {
                    Err(mut int) => {
                        $(match int.next_byte($nb) {
                            Ok(v) => assert_eq!(v, $nb_res),
                            _ => panic!("IntegerDecoder::next_byte() failed!"),
                        })*
                    }
                    _ => panic!("IntegerDecoder::first_byte() failed!"),
                }
            };
        }

        /// The following test cases are from RFC7541.
        fn rfc7541_test_cases() {
            // Encoding 10 using a 5-bit prefix.
            integer_test_case!(0x0a, 0x1f => 10);

            // Encoding 1337 using a 5-bit prefix.
            integer_test_case!(
                0x1f, 0x1f,
                0x9a => None,
                0x0a => Some(1337),
            );

            // Encoding 42 starting at an octet boundary.
            integer_test_case!(0x2a, 0xff => 42);
        }
    }

    /// UT test cases for the 32-bit bounds of `IntegerDecoder`.
    ///
    /// # Brief
    /// 1. Decodes the largest representable integer, `i32::MAX`.
    /// 2. Decodes `i32::MAX + 1` and a continuation byte with bits past
    ///    position 31.
    /// 3. Checks that only the first decoding succeeds.
    #[test]
    fn ut_integer_decode_bounds() {
        // 2^31 - 1 = 127 + (0x80 0xff 0xff 0xff 0x07).
        let mut int = IntegerDecoder::first_byte(0x7f, 0x7f).unwrap_err();
        assert_eq!(int.next_byte(0x80), Ok(None));
        assert_eq!(int.next_byte(0xff), Ok(None));
        assert_eq!(int.next_byte(0xff), Ok(None));
        assert_eq!(int.next_byte(0xff), Ok(None));
        assert_eq!(int.next_byte(0x07), Ok(Some(i32::MAX as usize)));

        // 2^31 = 127 + (0x81 0xff 0xff 0xff 0x07) overflows the final sum.
        let mut int = IntegerDecoder::first_byte(0x7f, 0x7f).unwrap_err();
        assert_eq!(int.next_byte(0x81), Ok(None));
        assert_eq!(int.next_byte(0xff), Ok(None));
        assert_eq!(int.next_byte(0xff), Ok(None));
        assert_eq!(int.next_byte(0xff), Ok(None));
        assert_eq!(
            int.next_byte(0x07),
            Err(DecompressionError::IntegerOverflow)
        );

        // A fifth continuation byte with any of its top five bits set shifts
        // past position 31.
        let mut int = IntegerDecoder::first_byte(0x7f, 0x7f).unwrap_err();
        assert_eq!(int.next_byte(0x80), Ok(None));
        assert_eq!(int.next_byte(0x80), Ok(None));
        assert_eq!(int.next_byte(0x80), Ok(None));
        assert_eq!(int.next_byte(0x80), Ok(None));
        assert_eq!(
            int.next_byte(0x08),
            Err(DecompressionError::IntegerOverflow)
        );
    }
}
