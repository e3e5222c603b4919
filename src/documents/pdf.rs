//! Single-page PDF writer using the built-in Helvetica faces.
//!
//! Only what invoices and gift cards need: positioned text in two weights
//! and straight rules. Text is encoded as WinAnsi so Swedish letters print.

use std::fmt::Write as _;

/// A4 in points.
pub const PAGE_WIDTH: f32 = 595.0;
pub const PAGE_HEIGHT: f32 = 842.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource(&self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }
}

#[derive(Debug, Default)]
pub struct PdfPage {
    ops: String,
}

impl PdfPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draws `text` with its baseline starting at (`x`, `y`), origin bottom-left.
    pub fn text(&mut self, x: f32, y: f32, size: f32, font: Font, text: &str) -> &mut Self {
        let _ = writeln!(
            self.ops,
            "BT /{} {:.1} Tf {:.2} {:.2} Td ({}) Tj ET",
            font.resource(),
            size,
            x,
            y,
            escape_text(text)
        );
        self
    }

    /// Right-aligned text ending at `right_x`, using an approximate glyph width.
    pub fn text_right(&mut self, right_x: f32, y: f32, size: f32, font: Font, text: &str) -> &mut Self {
        let width = approx_width(text, size);
        self.text(right_x - width, y, size, font, text)
    }

    pub fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, width: f32) -> &mut Self {
        let _ = writeln!(
            self.ops,
            "{:.2} w {:.2} {:.2} m {:.2} {:.2} l S",
            width, x1, y1, x2, y2
        );
        self
    }

    /// Serializes a complete PDF document containing this page.
    pub fn to_bytes(&self) -> Vec<u8> {
        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] \
                 /Resources << /Font << /F1 4 0 R /F2 5 0 R >> >> /Contents 6 0 R >>",
                PAGE_WIDTH, PAGE_HEIGHT
            ),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
                .to_string(),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>"
                .to_string(),
            format!(
                "<< /Length {} >>\nstream\n{}endstream",
                self.ops.len(),
                self.ops
            ),
        ];

        let mut out = String::from("%PDF-1.4\n");
        let mut offsets = Vec::with_capacity(objects.len());
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            let _ = write!(out, "{} 0 obj\n{}\nendobj\n", i + 1, body);
        }

        let xref_at = out.len();
        let _ = write!(out, "xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
        for offset in offsets {
            let _ = write!(out, "{:010} 00000 n \n", offset);
        }
        let _ = write!(
            out,
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_at
        );

        out.into_bytes()
    }
}

/// Escapes a string for a PDF literal. Non-ASCII characters are written as
/// octal WinAnsi codes so the output stays 7-bit and byte offsets are exact.
fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            ' '..='~' => out.push(ch),
            _ => {
                let code = win_ansi(ch).unwrap_or(b'?');
                if code.is_ascii() {
                    out.push(code as char);
                } else {
                    let _ = write!(out, "\\{:03o}", code);
                }
            }
        }
    }
    out
}

fn win_ansi(ch: char) -> Option<u8> {
    match ch {
        '€' => Some(0x80),
        '–' => Some(0x96),
        '—' => Some(0x97),
        '‘' => Some(0x91),
        '’' => Some(0x92),
        '“' => Some(0x93),
        '”' => Some(0x94),
        '•' => Some(0x95),
        '\u{a0}'..='\u{ff}' => Some(ch as u32 as u8),
        _ => None,
    }
}

fn approx_width(text: &str, size: f32) -> f32 {
    // Helvetica averages a little over half an em per glyph; digits are 0.556.
    text.chars().count() as f32 * size * 0.54
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_handles_parens_and_swedish() {
        assert_eq!(escape_text("a(b)\\"), "a\\(b\\)\\\\");
        assert_eq!(escape_text("Åsa"), "\\305sa");
        assert_eq!(escape_text("öre"), "\\366re");
        assert_eq!(escape_text("日"), "?");
    }

    #[test]
    fn test_document_structure() {
        let mut page = PdfPage::new();
        page.text(50.0, 800.0, 12.0, Font::Bold, "Faktura")
            .line(50.0, 790.0, 545.0, 790.0, 0.5);
        let bytes = page.to_bytes();
        let text = String::from_utf8(bytes).unwrap();

        assert!(text.starts_with("%PDF-1.4"));
        assert!(text.ends_with("%%EOF\n"));
        assert!(text.contains("(Faktura) Tj"));

        // startxref must point at the xref table.
        let startxref: usize = text
            .rsplit("startxref\n")
            .next()
            .and_then(|s| s.lines().next())
            .and_then(|s| s.parse().ok())
            .unwrap();
        assert!(text[startxref..].starts_with("xref"));

        // Each xref offset must point at its object header.
        let xref = &text[startxref..];
        for (i, line) in xref.lines().skip(3).take(6).enumerate() {
            let offset: usize = line[..10].parse().unwrap();
            assert!(text[offset..].starts_with(&format!("{} 0 obj", i + 1)));
        }
    }
}
