//! Wildcard expansion, the second decompression stage.
//!
//! After zlib inflation the stream still packs runs of zero bytes and high
//! nibbles into single marker bytes in `0xF0..=0xFF`:
//!
//! | marker        | meaning                                              |
//! |---------------|------------------------------------------------------|
//! | `0xF0`        | escape: the next byte is emitted verbatim            |
//! | `0xF1 B`      | emits `0xF0 | B>>4` then `0xF0 | B&0xF`              |
//! | `0xF2`-`0xFE` | `marker & 0x0F` zero bytes                           |
//! | `0xFF b1 b2`  | `00 00 00 b1 00 00 00 b2 00 00 00`                   |

use std::collections::VecDeque;

use crate::{Error, Result};

const ESCAPE: u8 = 0xF0;
const SWITCH: u8 = 0xF1;
const WIDE_PAD: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    None,
    /// Next byte is copied through untouched
    Escape,
    /// Next byte is split into two marker-range nibbles
    Switch,
}

/// Expand wildcard markers in one left-to-right pass
///
/// Queued output is always drained before more input is consumed, so bytes
/// produced by one marker keep their order.
pub fn expand(input: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(input.len() + input.len() / 2);
    let mut queue: VecDeque<u8> = VecDeque::new();
    let mut state = ReadState::None;
    let mut marker_offset = 0;
    let mut pos = 0;

    while pos < input.len() || !queue.is_empty() {
        if let Some(byte) = queue.pop_front() {
            output.push(byte);
            continue;
        }

        let byte = input[pos];
        pos += 1;

        match state {
            ReadState::Escape => {
                output.push(byte);
                state = ReadState::None;
            }
            ReadState::Switch => {
                output.push(0xF0 | (byte >> 4));
                queue.push_back(0xF0 | (byte & 0x0F));
                state = ReadState::None;
            }
            ReadState::None => match byte {
                ESCAPE => {
                    marker_offset = pos - 1;
                    state = ReadState::Escape;
                }
                SWITCH => {
                    marker_offset = pos - 1;
                    state = ReadState::Switch;
                }
                WIDE_PAD => {
                    let (Some(&b1), Some(&b2)) = (input.get(pos), input.get(pos + 1)) else {
                        return Err(Error::Truncated {
                            offset: pos - 1,
                            needed: 3,
                            available: input.len() - (pos - 1),
                        });
                    };
                    pos += 2;
                    queue.extend([0, 0, 0, b1, 0, 0, 0, b2, 0, 0, 0]);
                }
                0xF2..=0xFE => {
                    queue.extend(std::iter::repeat_n(0u8, (byte & 0x0F) as usize));
                }
                _ => output.push(byte),
            },
        }
    }

    if state != ReadState::None {
        return Err(Error::Truncated {
            offset: marker_offset,
            needed: 2,
            available: 1,
        });
    }

    Ok(output)
}
