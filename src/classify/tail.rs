// src/classify/tail.rs

use std::collections::VecDeque;

/// Last `n` characters of `text` (character-boundary safe).
pub fn tail(text: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match text.char_indices().rev().nth(n - 1) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

/// Bounded buffer that keeps only the last `capacity` characters pushed
/// into it.
///
/// Used while reading a child's output so memory stays bounded no matter
/// how much the process prints.
#[derive(Debug, Clone)]
pub struct TailBuffer {
    capacity: usize,
    chars: VecDeque<char>,
    /// Trailing bytes of an incomplete UTF-8 sequence (at most 3).
    pending: Vec<u8>,
}

impl TailBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            chars: VecDeque::with_capacity(capacity.min(8192)),
            pending: Vec::new(),
        }
    }

    pub fn push_str(&mut self, s: &str) {
        for c in s.chars() {
            if self.capacity == 0 {
                return;
            }
            if self.chars.len() == self.capacity {
                self.chars.pop_front();
            }
            self.chars.push_back(c);
        }
    }

    /// Append raw output bytes.
    ///
    /// A multi-byte character split across two calls is decoded once both
    /// halves arrive; invalid sequences become U+FFFD.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        let joined;
        let mut rest = if self.pending.is_empty() {
            bytes
        } else {
            let mut buf = std::mem::take(&mut self.pending);
            buf.extend_from_slice(bytes);
            joined = buf;
            &joined[..]
        };

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.push_str(text);
                    return;
                }
                Err(e) => {
                    let (valid, tail) = rest.split_at(e.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        self.push_str(text);
                    }
                    match e.error_len() {
                        None => {
                            self.pending = tail.to_vec();
                            return;
                        }
                        Some(bad) => {
                            self.push_str("\u{FFFD}");
                            rest = &tail[bad..];
                        }
                    }
                }
            }
        }
    }

    /// Flush an incomplete trailing sequence as U+FFFD.
    pub fn finish(&mut self) {
        if !self.pending.is_empty() {
            self.pending.clear();
            self.push_str("\u{FFFD}");
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn contents(&self) -> String {
        self.chars.iter().collect()
    }
}
