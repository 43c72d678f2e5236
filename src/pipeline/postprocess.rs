//! Post-processing: make extracted text safe to embed in XML.
//!
//! Native text layers and OCR output both carry debris that XML 1.0 cannot
//! hold: NUL bytes from broken font encodings, form feeds between columns,
//! stray `\x1b` sequences. Each rule below is a pure `&str → String` pass.
//!
//! ## Rule Order
//!
//! Carriage returns are dropped first, so no `\r` survives to the control
//! character pass. Trimming runs last, after stripping may have exposed
//! new leading or trailing whitespace.

use once_cell::sync::Lazy;
use regex::Regex;

/// Clean a page's text for the `<text>` node of `combined.xml`.
///
/// Rules (applied in order):
/// 1. Drop carriage returns (CRLF becomes LF, a lone CR disappears)
/// 2. Strip characters XML 1.0 forbids (C0 controls other than tab and
///    line feed, plus U+FFFE / U+FFFF)
/// 3. Trim surrounding whitespace
pub fn clean_page_text(input: &str) -> String {
    let s = drop_carriage_returns(input);
    let s = strip_forbidden_chars(&s);
    s.trim().to_string()
}

/// Clean one table cell. Same as [`clean_page_text`] minus trimming, so cell
/// padding the engine reported is kept.
pub fn clean_cell_text(input: &str) -> String {
    let s = drop_carriage_returns(input);
    strip_forbidden_chars(&s)
}

// ── Rule 1: Drop carriage returns ────────────────────────────────────────────

fn drop_carriage_returns(input: &str) -> String {
    input.replace('\r', "")
}

// ── Rule 2: Strip forbidden characters ───────────────────────────────────────

static RE_FORBIDDEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x{FFFE}\x{FFFF}]").expect("static regex")
});

fn strip_forbidden_chars(input: &str) -> String {
    RE_FORBIDDEN.replace_all(input, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_nul_and_carriage_returns() {
        let cleaned = clean_page_text("a\0b\r\nc\rd");
        assert_eq!(cleaned, "ab\ncd", "CRLF keeps its LF, a lone CR is dropped");
        assert!(!cleaned.contains('\0'));
        assert!(!cleaned.contains('\r'));
    }

    #[test]
    fn keeps_tabs_and_newlines() {
        assert_eq!(clean_page_text("col1\tcol2\nrow"), "col1\tcol2\nrow");
    }

    #[test]
    fn strips_every_c0_control_except_tab_lf() {
        let all: String = (0u8..0x20).map(char::from).collect();
        let cleaned = strip_forbidden_chars(&all);
        assert_eq!(cleaned, "\t\n\r");
    }

    #[test]
    fn strips_noncharacters() {
        assert_eq!(clean_page_text("x\u{FFFE}y\u{FFFF}z"), "xyz");
    }

    #[test]
    fn trims_page_text_but_not_cells() {
        assert_eq!(clean_page_text("  \n text \n "), "text");
        assert_eq!(clean_cell_text(" 12 \u{0c}"), " 12 ");
    }

    #[test]
    fn unicode_survives() {
        assert_eq!(clean_page_text("Größe – 日本語"), "Größe – 日本語");
    }
}
