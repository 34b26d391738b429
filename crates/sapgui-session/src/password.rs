//! Generation of replacement SAP passwords.

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use std::fmt;

/// Length of every generated password.
pub const PASSWORD_LENGTH: usize = 17;

const LOWER: &[u8] = b"abcdefghijkmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const DIGITS: &[u8] = b"23456789";
// SAP rejects some characters in passwords typed via sapshcut (e.g. quotes,
// backslash, space), so keep to a conservative symbol set.
const SYMBOLS: &[u8] = b"!#%&()*+-.:;=?@_";

/// A freshly generated password.
///
/// `Debug` and `Display` only ever show [`GeneratedPassword::masked`].
#[derive(Clone, PartialEq, Eq)]
pub struct GeneratedPassword(String);

impl GeneratedPassword {
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// First three characters followed by `***`.
    pub fn masked(&self) -> String {
        let prefix: String = self.0.chars().take(3).collect();
        format!("{prefix}***")
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for GeneratedPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GeneratedPassword")
            .field(&self.masked())
            .finish()
    }
}

impl fmt::Display for GeneratedPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

/// Generates a password of exactly `length` characters using the OS CSPRNG.
///
/// Every password contains at least one lowercase letter, uppercase letter,
/// digit and symbol; visually ambiguous characters (`0 O 1 l I`) are never used.
/// Lengths below 4 cannot satisfy that and are raised to 4.
pub fn generate_password(length: usize) -> GeneratedPassword {
    let length = length.max(4);
    let mut rng = OsRng;
    let classes = [LOWER, UPPER, DIGITS, SYMBOLS];
    let all: Vec<u8> = classes.concat();

    let mut bytes: Vec<u8> = classes
        .iter()
        .map(|class| *class.choose(&mut rng).unwrap_or(&b'x'))
        .collect();
    while bytes.len() < length {
        bytes.push(*all.choose(&mut rng).unwrap_or(&b'x'));
    }
    bytes.shuffle(&mut rng);

    GeneratedPassword(bytes.into_iter().map(char::from).collect())
}
