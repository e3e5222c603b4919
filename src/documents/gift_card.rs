use crate::{
    config::StudioConfig,
    documents::pdf::{Font, PdfPage, PAGE_HEIGHT, PAGE_WIDTH},
    domain::{format_local, format_sek, GiftCard},
};

pub fn render_gift_card(studio: &StudioConfig, card: &GiftCard) -> Vec<u8> {
    let left = 70.0;
    let right = PAGE_WIDTH - 70.0;
    let top = PAGE_HEIGHT - 120.0;
    let mut page = PdfPage::new();

    // Frame
    page.line(left, top + 30.0, right, top + 30.0, 2.0)
        .line(left, top - 380.0, right, top - 380.0, 2.0)
        .line(left, top + 30.0, left, top - 380.0, 2.0)
        .line(right, top + 30.0, right, top - 380.0, 2.0);

    let mut y = top - 20.0;
    page.text(left + 30.0, y, 14.0, Font::Regular, &studio.name);
    y -= 50.0;
    page.text(left + 30.0, y, 36.0, Font::Bold, "Presentkort");
    y -= 60.0;
    page.text(left + 30.0, y, 28.0, Font::Bold, &format_sek(card.initial_amount_ore));

    y -= 50.0;
    if let Some(name) = card.recipient_name.as_deref() {
        page.text(left + 30.0, y, 12.0, Font::Regular, &format!("Till: {}", name));
        y -= 18.0;
    }
    page.text(left + 30.0, y, 12.0, Font::Regular, &format!("Från: {}", card.buyer_name));
    y -= 18.0;

    if let Some(message) = card.message.as_deref() {
        for line in wrap(message, 60).iter().take(4) {
            y -= 16.0;
            page.text(left + 30.0, y, 11.0, Font::Regular, line);
        }
        y -= 8.0;
    }

    y -= 30.0;
    page.text(left + 30.0, y, 10.0, Font::Regular, "Kod");
    y -= 22.0;
    page.text(left + 30.0, y, 20.0, Font::Bold, &card.code);

    if let Some(expires) = card.expires_at {
        page.text_right(
            right - 30.0,
            y,
            10.0,
            Font::Regular,
            &format!("Giltigt till {}", &format_local(expires)[..10]),
        );
    }

    page.text(
        left,
        top - 410.0,
        9.0,
        Font::Regular,
        "Lös in presentkortet genom att ange koden när du bokar en kurs.",
    );

    page.to_bytes()
}

/// Greedy word wrap on character count.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap() {
        assert_eq!(wrap("ett två tre fyra", 8), vec!["ett två", "tre fyra"]);
        assert!(wrap("   ", 10).is_empty());
    }
}
