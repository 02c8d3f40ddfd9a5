/// Leading byte-order mark some spreadsheet exports prepend.
const BOM: char = '\u{feff}';

/// Drop a leading byte-order mark, if any.
pub fn strip_bom(text: &str) -> &str {
    text.strip_prefix(BOM).unwrap_or(text)
}

/// 1) Trim whitespace + lowercase. Applied to every data field.
pub fn clean_field(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// 2) Header names get the field cleanup plus spaces → underscores,
///    e.g. `" Order Date "` → `"order_date"`.
pub fn normalize_header(raw: &str) -> String {
    clean_field(raw).replace(' ', "_")
}

/// 3) Count the empty lines the CSV reader skipped right after the record that
///    ended at byte `prev_end` (0 for the start of the document).
///
/// A line break is `\r\n`, `\r` or `\n`. When the reader stopped before the
/// previous record's own line break, or between its `\r` and `\n`, that break
/// is not counted as an empty line.
pub fn skipped_blank_lines(bytes: &[u8], prev_end: usize) -> usize {
    let mut rest = &bytes[prev_end.min(bytes.len())..];
    let mut own_break_pending = false;
    match prev_end.checked_sub(1).and_then(|i| bytes.get(i)) {
        None | Some(b'\n') => {}
        Some(b'\r') => {
            if rest.first() == Some(&b'\n') {
                rest = &rest[1..];
            }
        }
        Some(_) => own_break_pending = true,
    }

    let mut breaks: usize = 0;
    let mut i = 0;
    while i < rest.len() {
        match rest[i] {
            b'\r' if rest.get(i + 1) == Some(&b'\n') => i += 2,
            b'\r' | b'\n' => i += 1,
            _ => break,
        }
        breaks += 1;
    }

    if own_break_pending {
        breaks.saturating_sub(1)
    } else {
        breaks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_bom() {
        assert_eq!(strip_bom("\u{feff}Name,City"), "Name,City");
        assert_eq!(strip_bom("Name,City"), "Name,City");
        // only the leading one
        assert_eq!(strip_bom("a\u{feff}"), "a\u{feff}");
    }

    #[test]
    fn test_clean_field() {
        assert_eq!(clean_field("  Alice "), "alice");
        assert_eq!(clean_field("NYC"), "nyc");
        assert_eq!(clean_field("Two Words"), "two words");
        assert_eq!(clean_field(""), "");
        assert_eq!(clean_field("\tÉCOLE\n"), "école");
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header(" Order Date "), "order_date");
        assert_eq!(normalize_header("First  Name"), "first__name");
        assert_eq!(normalize_header("ID"), "id");
    }

    #[test]
    fn test_normalize_header_idempotent() {
        for raw in [" Order Date ", "A B C", "already_clean", "  ", "MiXeD Case"] {
            let once = normalize_header(raw);
            assert_eq!(normalize_header(&once), once, "input {:?}", raw);
        }
    }

    #[test]
    fn test_skipped_blank_lines() {
        // start of document
        assert_eq!(skipped_blank_lines(b"\n\nA\n", 0), 2);
        assert_eq!(skipped_blank_lines(b"A\n", 0), 0);
        // previous record's break already consumed
        assert_eq!(skipped_blank_lines(b"a\n\nb\n", 2), 1);
        assert_eq!(skipped_blank_lines(b"a\r\n\r\nb", 3), 1);
        // previous record's break still pending
        assert_eq!(skipped_blank_lines(b"a\n\nb\n", 1), 1);
        assert_eq!(skipped_blank_lines(b"a\nb", 1), 0);
        // stopped between \r and \n
        assert_eq!(skipped_blank_lines(b"a\r\nb", 2), 0);
        assert_eq!(skipped_blank_lines(b"a\r\n\rb", 2), 1);
        // trailing empty lines at end of input
        assert_eq!(skipped_blank_lines(b"a\n\n", 2), 1);
        assert_eq!(skipped_blank_lines(b"a\n", 2), 0);
    }
}
