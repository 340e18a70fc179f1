//! Presentation-form <-> wire-form domain names.
//!
//! `example.com.` parses into length-prefixed labels ending in the
//! zero-length root label. Escapes follow RFC 1035: `\DDD` is exactly three
//! decimal digits, anything else after the backslash stands for itself.

use crate::key::{MAX_KEY, MAX_LABEL};

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty label")]
    EmptyLabel,
    #[error("label exceeds 63 octets")]
    LabelTooLong,
    #[error("name exceeds 255 octets")]
    NameTooLong,
    #[error("bad escape sequence")]
    BadEscape,
}

/// Parses a presentation-form name into wire form. A name without a trailing
/// dot is taken as absolute; the lone `"."` is the root.
pub fn parse(name: &str) -> Result<Vec<u8>, ParseError> {
    let bytes = name.as_bytes();
    if bytes.is_empty() {
        return Err(ParseError::EmptyLabel);
    }
    if bytes == b"." {
        return Ok(vec![0]);
    }

    let mut wire = Vec::with_capacity(bytes.len() + 2);
    let mut label: Vec<u8> = Vec::with_capacity(MAX_LABEL);
    let mut i = 0usize;
    loop {
        match bytes.get(i) {
            None | Some(&b'.') => {
                let trailing_dot = bytes.get(i).is_some() && i + 1 == bytes.len();
                if label.is_empty() {
                    return Err(ParseError::EmptyLabel);
                }
                if label.len() > MAX_LABEL {
                    return Err(ParseError::LabelTooLong);
                }
                wire.push(label.len() as u8);
                wire.append(&mut label);
                if bytes.get(i).is_none() || trailing_dot {
                    break;
                }
                i += 1;
            }
            Some(&b'\\') => {
                i += 1;
                match bytes.get(i) {
                    None => return Err(ParseError::BadEscape),
                    Some(d) if d.is_ascii_digit() => {
                        // \DDD: exactly three decimal digits, value <= 255
                        if i + 2 >= bytes.len() {
                            return Err(ParseError::BadEscape);
                        }
                        let digits = &bytes[i..i + 3];
                        if !digits.iter().all(|d| d.is_ascii_digit()) {
                            return Err(ParseError::BadEscape);
                        }
                        let value = (digits[0] - b'0') as u16 * 100
                            + (digits[1] - b'0') as u16 * 10
                            + (digits[2] - b'0') as u16;
                        if value > 255 {
                            return Err(ParseError::BadEscape);
                        }
                        label.push(value as u8);
                        i += 3;
                    }
                    Some(&c) => {
                        label.push(c);
                        i += 1;
                    }
                }
            }
            Some(&c) => {
                label.push(c);
                i += 1;
            }
        }
    }
    wire.push(0);
    if wire.len() > MAX_KEY {
        return Err(ParseError::NameTooLong);
    }
    Ok(wire)
}

/// Renders a wire-form name back to presentation form. `.` and `\` are
/// escaped as themselves, bytes outside printable ASCII as `\DDD`.
pub fn to_presentation(wire: &[u8]) -> String {
    let mut out = String::new();
    let mut pos = 0usize;
    loop {
        let Some(&len) = wire.get(pos) else { break };
        if len == 0 {
            break;
        }
        let start = pos + 1;
        let end = (start + len as usize).min(wire.len());
        for &b in &wire[start..end] {
            match b {
                b'.' | b'\\' => {
                    out.push('\\');
                    out.push(b as char);
                }
                0x21..=0x7E => out.push(b as char),
                _ => out.push_str(&format!("\\{b:03}")),
            }
        }
        out.push('.');
        pos = end;
    }
    if out.is_empty() {
        out.push('.');
    }
    out
}
