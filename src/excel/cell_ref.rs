//! A1-style cell and range references

/// Convert a 0-based column index to letters (0 → A, 26 → AA)
pub fn column_letter(index: usize) -> String {
    let mut result = String::new();
    let mut idx = index;

    loop {
        let remainder = idx % 26;
        result.insert(0, (b'A' + remainder as u8) as char);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }

    result
}

/// Convert column letters to a 0-based index (A → 0, AA → 26)
pub fn column_index(letters: &str) -> Option<usize> {
    let letters = letters.trim().trim_start_matches('$');
    if letters.is_empty() {
        return None;
    }

    let mut index: usize = 0;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        let digit = (ch.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        index = index.checked_mul(26)?.checked_add(digit)?;
    }
    Some(index - 1)
}

/// Parse `B3` into a 0-based (row, column) pair
pub fn parse_cell(reference: &str) -> Option<(u32, u16)> {
    let reference = reference.trim().replace('$', "");
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);

    let col = column_index(letters)?;
    let row: u32 = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((row - 1, u16::try_from(col).ok()?))
}

/// Parse `A1:C2` into 0-based inclusive corners; a single cell yields a 1x1 range
pub fn parse_range(reference: &str) -> Option<((u32, u16), (u32, u16))> {
    match reference.split_once(':') {
        Some((first, last)) => {
            let (r1, c1) = parse_cell(first)?;
            let (r2, c2) = parse_cell(last)?;
            Some(((r1.min(r2), c1.min(c2)), (r1.max(r2), c1.max(c2))))
        }
        None => {
            let cell = parse_cell(reference)?;
            Some((cell, cell))
        }
    }
}

/// Format 0-based inclusive corners as `A1:C2`
pub fn format_range(first: (u32, u16), last: (u32, u16)) -> String {
    format!(
        "{}{}:{}{}",
        column_letter(first.1 as usize),
        first.0 + 1,
        column_letter(last.1 as usize),
        last.0 + 1
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letter() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(701), "ZZ");
        assert_eq!(column_letter(702), "AAA");
    }

    #[test]
    fn test_column_index_inverts_letter() {
        for idx in [0, 1, 25, 26, 51, 701, 702, 16383] {
            assert_eq!(column_index(&column_letter(idx)), Some(idx));
        }
        assert_eq!(column_index("b"), Some(1));
        assert_eq!(column_index(""), None);
        assert_eq!(column_index("A1"), None);
    }

    #[test]
    fn test_parse_cell() {
        assert_eq!(parse_cell("A1"), Some((0, 0)));
        assert_eq!(parse_cell("$C$7"), Some((6, 2)));
        assert_eq!(parse_cell("A0"), None);
        assert_eq!(parse_cell("12"), None);
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("A1:C2"), Some(((0, 0), (1, 2))));
        assert_eq!(parse_range("C2:A1"), Some(((0, 0), (1, 2))));
        assert_eq!(parse_range("B4"), Some(((3, 1), (3, 1))));
        assert_eq!(parse_range("nope"), None);
    }

    #[test]
    fn test_format_range() {
        assert_eq!(format_range((0, 0), (0, 2)), "A1:C1");
        assert_eq!(format_range((5, 1), (6, 27)), "B6:AB7");
    }
}
