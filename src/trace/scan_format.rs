//! Scan/print format specifier parser (spec §4.1, §4.9).
//!
//! A direct port of `ScanConversionSpecifier::readNextFrom` from
//! `original_source/lib/Trace/ScanFormatSpecifiers.cpp`: find `%`, read
//! optional `*` (assignment suppression), optional field width digits,
//! optional length modifier, the specifier character, and — for `%[...]` —
//! a 256-entry set-membership table with `^` negation and the `]`-as-
//! first-character special case.
//!
//! Pure function of the format string; no I/O, used by recording-side
//! library checkers to classify each conversion and by replay-side error
//! descriptions (spec §4.9).

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthModifier {
    None,
    Hh,
    H,
    L,
    Ll,
    LongDouble,
    J,
    Z,
    T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Specifier {
    D,
    I,
    O,
    U,
    X,
    A,
    E,
    F,
    G,
    C,
    S,
    Set,
    N,
    P,
    Percent,
}

impl Specifier {
    /// Whether leading whitespace in the input is consumed before this
    /// conversion is attempted. Per C11 §7.21.6.2, every specifier except
    /// `c`, `[`, `n`, and `%` skips leading whitespace.
    pub fn consumes_leading_whitespace(&self) -> bool {
        !matches!(
            self,
            Specifier::C | Specifier::Set | Specifier::N | Specifier::Percent
        )
    }

    /// Whether `*` assignment suppression is legal for this specifier.
    /// `%%` matches a literal `%` and never assigns, so suppression on it
    /// is meaningless and rejected.
    pub fn allows_suppression(&self) -> bool {
        !matches!(self, Specifier::Percent)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScanFormatError {
    #[error("no '%' conversion found in remainder of format string")]
    SpecifierParseFailure,
    #[error("assignment suppression is not allowed for this specifier")]
    SuppressionNotAllowed,
}

/// One parsed conversion, with the byte range `[start, end)` it occupied
/// in the source format string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    pub start: usize,
    pub end: usize,
    pub suppress_assignment: bool,
    pub width: Option<u64>,
    pub length_modifier: LengthModifier,
    pub specifier: Specifier,
    /// Only populated for `Specifier::Set`: a 256-entry membership table
    /// (after negation has already been applied, matching the original's
    /// `SetLookup`).
    pub set_membership: Option<Box<[bool; 256]>>,
    pub set_negation: bool,
}

impl Conversion {
    pub fn is_whitespace_consuming(&self) -> bool {
        self.specifier.consumes_leading_whitespace()
    }

    pub fn is_in_set(&self, ch: u8) -> bool {
        self.set_membership
            .as_ref()
            .map(|table| table[ch as usize])
            .unwrap_or(false)
    }
}

fn read_length_modifier(bytes: &[u8], pos: &mut usize) -> LengthModifier {
    let rest = &bytes[*pos..];
    let (modifier, consumed) = if rest.starts_with(b"hh") {
        (LengthModifier::Hh, 2)
    } else if rest.starts_with(b"ll") {
        (LengthModifier::Ll, 2)
    } else if rest.starts_with(b"h") {
        (LengthModifier::H, 1)
    } else if rest.starts_with(b"l") {
        (LengthModifier::L, 1)
    } else if rest.starts_with(b"L") {
        (LengthModifier::LongDouble, 1)
    } else if rest.starts_with(b"j") {
        (LengthModifier::J, 1)
    } else if rest.starts_with(b"z") {
        (LengthModifier::Z, 1)
    } else if rest.starts_with(b"t") {
        (LengthModifier::T, 1)
    } else {
        (LengthModifier::None, 0)
    };
    *pos += consumed;
    modifier
}

fn specifier_for_char(c: u8) -> Option<Specifier> {
    Some(match c {
        b'd' => Specifier::D,
        b'i' => Specifier::I,
        b'o' => Specifier::O,
        b'u' => Specifier::U,
        b'x' | b'X' => Specifier::X,
        b'a' | b'A' => Specifier::A,
        b'e' | b'E' => Specifier::E,
        b'f' | b'F' => Specifier::F,
        b'g' | b'G' => Specifier::G,
        b'c' => Specifier::C,
        b's' => Specifier::S,
        b'[' => Specifier::Set,
        b'n' => Specifier::N,
        b'p' => Specifier::P,
        b'%' => Specifier::Percent,
        _ => return None,
    })
}

/// Parse the first `%`-conversion found at or after `start` in `format`.
pub fn read_next_from(format: &[u8], start: usize) -> Result<Conversion, ScanFormatError> {
    let percent_pos = format[start..]
        .iter()
        .position(|&b| b == b'%')
        .map(|p| p + start)
        .ok_or(ScanFormatError::SpecifierParseFailure)?;

    let mut pos = percent_pos + 1;
    if pos >= format.len() {
        return Err(ScanFormatError::SpecifierParseFailure);
    }

    let mut suppress_assignment = false;
    if format[pos] == b'*' {
        suppress_assignment = true;
        pos += 1;
        if pos >= format.len() {
            return Err(ScanFormatError::SpecifierParseFailure);
        }
    }

    let mut width = None;
    if format[pos].is_ascii_digit() {
        let digits_start = pos;
        while pos < format.len() && format[pos].is_ascii_digit() {
            pos += 1;
        }
        let text = std::str::from_utf8(&format[digits_start..pos]).unwrap();
        width = Some(text.parse::<u64>().unwrap());
        if pos >= format.len() {
            return Err(ScanFormatError::SpecifierParseFailure);
        }
    }

    let length_modifier = read_length_modifier(format, &mut pos);
    if pos >= format.len() {
        return Err(ScanFormatError::SpecifierParseFailure);
    }

    let specifier =
        specifier_for_char(format[pos]).ok_or(ScanFormatError::SpecifierParseFailure)?;
    pos += 1;

    if suppress_assignment && !specifier.allows_suppression() {
        return Err(ScanFormatError::SuppressionNotAllowed);
    }

    let mut set_membership = None;
    let mut set_negation = false;

    if specifier == Specifier::Set {
        let mut table = Box::new([false; 256]);

        if pos >= format.len() {
            return Err(ScanFormatError::SpecifierParseFailure);
        }
        if format[pos] == b'^' {
            set_negation = true;
            pos += 1;
            if pos >= format.len() {
                return Err(ScanFormatError::SpecifierParseFailure);
            }
        }
        if pos < format.len() && format[pos] == b']' {
            table[b']' as usize] = true;
            pos += 1;
            if pos >= format.len() {
                return Err(ScanFormatError::SpecifierParseFailure);
            }
        }
        while pos < format.len() && format[pos] != b']' {
            table[format[pos] as usize] = true;
            pos += 1;
        }
        if pos >= format.len() {
            return Err(ScanFormatError::SpecifierParseFailure);
        }
        // Consume the closing ']'.
        pos += 1;

        if set_negation {
            for entry in table.iter_mut() {
                *entry = !*entry;
            }
        }
        set_membership = Some(table);
    }

    Ok(Conversion {
        start: percent_pos,
        end: pos,
        suppress_assignment,
        width,
        length_modifier,
        specifier,
        set_membership,
        set_negation,
    })
}

/// Parse every conversion in `format`, in order.
pub fn parse_all(format: &str) -> Result<Vec<Conversion>, ScanFormatError> {
    let bytes = format.as_bytes();
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        if !bytes[pos..].contains(&b'%') {
            break;
        }
        let conversion = read_next_from(bytes, pos)?;
        pos = conversion.end;
        out.push(conversion);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_decimal_conversion() {
        let c = read_next_from(b"%d", 0).unwrap();
        assert_eq!(c.specifier, Specifier::D);
        assert!(!c.suppress_assignment);
        assert_eq!(c.width, None);
    }

    #[test]
    fn width_and_suppression() {
        let c = read_next_from(b"%*3s", 0).unwrap();
        assert_eq!(c.specifier, Specifier::S);
        assert!(c.suppress_assignment);
        assert_eq!(c.width, Some(3));
    }

    #[test]
    fn length_modifiers() {
        assert_eq!(
            read_next_from(b"%hhd", 0).unwrap().length_modifier,
            LengthModifier::Hh
        );
        assert_eq!(
            read_next_from(b"%lld", 0).unwrap().length_modifier,
            LengthModifier::Ll
        );
        assert_eq!(
            read_next_from(b"%zu", 0).unwrap().length_modifier,
            LengthModifier::Z
        );
    }

    #[test]
    fn set_specifier_with_negation_and_bracket_literal() {
        let c = read_next_from(b"%[^]abc]", 0).unwrap();
        assert_eq!(c.specifier, Specifier::Set);
        assert!(c.set_negation);
        // ']' and 'a'/'b'/'c' were in the raw set, so after negation they
        // are *not* members; everything else is.
        assert!(!c.is_in_set(b']'));
        assert!(!c.is_in_set(b'a'));
        assert!(c.is_in_set(b'z'));
    }

    #[test]
    fn suppression_not_allowed_on_percent_literal() {
        let err = read_next_from(b"%*%", 0).unwrap_err();
        assert_eq!(err, ScanFormatError::SuppressionNotAllowed);
    }

    #[test]
    fn whitespace_consumption_matches_c11() {
        assert!(!Specifier::C.consumes_leading_whitespace());
        assert!(!Specifier::Set.consumes_leading_whitespace());
        assert!(!Specifier::N.consumes_leading_whitespace());
        assert!(Specifier::D.consumes_leading_whitespace());
    }

    #[test]
    fn parse_all_finds_every_conversion_in_order() {
        let convs = parse_all("%d-%s-%5c").unwrap();
        assert_eq!(convs.len(), 3);
        assert_eq!(convs[0].specifier, Specifier::D);
        assert_eq!(convs[1].specifier, Specifier::S);
        assert_eq!(convs[2].specifier, Specifier::C);
        assert_eq!(convs[2].width, Some(5));
    }
}
