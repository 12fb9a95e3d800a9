//! Shift cipher used to decode incoming submissions.
//!
//! Letters rotate inside their own case's 26-letter alphabet. When the
//! alphabet includes digits, `0`-`9` rotate inside a 10-symbol ring. All other
//! characters pass through untouched. Rotation uses Euclidean remainder so any
//! `i32` shift, negative ones included, lands in range.

use serde::{Deserialize, Serialize};

/// Which character classes the cipher rotates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alphabet {
    /// Only ASCII letters rotate.
    Letters,
    /// ASCII letters and ASCII digits rotate.
    LettersAndDigits,
}

/// A fixed-shift substitution cipher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftCipher {
    shift: i32,
    alphabet: Alphabet,
}

impl ShiftCipher {
    pub fn new(shift: i32, alphabet: Alphabet) -> Self {
        Self { shift, alphabet }
    }

    pub fn shift(&self) -> i32 {
        self.shift
    }

    pub fn alphabet(&self) -> Alphabet {
        self.alphabet
    }

    /// Shift every rotatable character backward by `shift`.
    pub fn decrypt(&self, text: &str) -> String {
        transform(text, -i64::from(self.shift), self.alphabet)
    }

    /// Inverse of [`ShiftCipher::decrypt`].
    pub fn encrypt(&self, text: &str) -> String {
        transform(text, i64::from(self.shift), self.alphabet)
    }
}

impl Default for ShiftCipher {
    fn default() -> Self {
        Self::new(3, Alphabet::LettersAndDigits)
    }
}

/// Decrypt `text` with `shift` over letters only.
pub fn decrypt_letters(text: &str, shift: i32) -> String {
    ShiftCipher::new(shift, Alphabet::Letters).decrypt(text)
}

/// Decrypt `text` with `shift` over letters and digits.
pub fn decrypt_alphanumeric(text: &str, shift: i32) -> String {
    ShiftCipher::new(shift, Alphabet::LettersAndDigits).decrypt(text)
}

fn transform(text: &str, offset: i64, alphabet: Alphabet) -> String {
    text.chars()
        .map(|c| match c {
            'a'..='z' => rotate(c, b'a', 26, offset),
            'A'..='Z' => rotate(c, b'A', 26, offset),
            '0'..='9' if alphabet == Alphabet::LettersAndDigits => rotate(c, b'0', 10, offset),
            _ => c,
        })
        .collect()
}

fn rotate(c: char, base: u8, modulus: i64, offset: i64) -> char {
    let index = i64::from(c as u8 - base);
    // rem_euclid keeps the result in [0, modulus) for negative offsets
    let rotated = (index + offset).rem_euclid(modulus) as u8;
    char::from(base + rotated)
}
