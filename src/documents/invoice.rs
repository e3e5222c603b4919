use crate::{
    config::StudioConfig,
    documents::pdf::{Font, PdfPage, PAGE_HEIGHT, PAGE_WIDTH},
    domain::{format_sek, Invoice, Payment},
};

const MARGIN: f32 = 56.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceLine {
    pub description: String,
    pub quantity: i32,
    pub unit_price_ore: i64,
}

impl InvoiceLine {
    pub fn total_ore(&self) -> i64 {
        self.unit_price_ore * i64::from(self.quantity)
    }
}

pub fn render_invoice(
    studio: &StudioConfig,
    invoice: &Invoice,
    payment: &Payment,
    lines: &[InvoiceLine],
) -> Vec<u8> {
    let right = PAGE_WIDTH - MARGIN;
    let mut page = PdfPage::new();
    let mut y = PAGE_HEIGHT - MARGIN - 10.0;

    page.text(MARGIN, y, 20.0, Font::Bold, &studio.name);
    page.text_right(right, y, 20.0, Font::Bold, "FAKTURA");
    y -= 18.0;
    page.text(MARGIN, y, 9.0, Font::Regular, &studio.address);
    y -= 12.0;
    page.text(MARGIN, y, 9.0, Font::Regular, &format!("Org.nr {}", studio.org_number));
    y -= 12.0;
    page.text(MARGIN, y, 9.0, Font::Regular, &studio.email);

    y -= 40.0;
    let meta = [
        ("Fakturanummer", invoice.invoice_number.to_string()),
        ("Fakturadatum", invoice.created_at.format("%Y-%m-%d").to_string()),
        ("Förfallodatum", invoice.due_date.format("%Y-%m-%d").to_string()),
        ("Referens", payment.reference.clone()),
    ];
    page.text(MARGIN, y, 10.0, Font::Bold, "Kund");
    let mut meta_y = y;
    for (label, value) in &meta {
        page.text(330.0, meta_y, 10.0, Font::Bold, label);
        page.text_right(right, meta_y, 10.0, Font::Regular, value);
        meta_y -= 14.0;
    }
    y -= 14.0;
    page.text(MARGIN, y, 10.0, Font::Regular, &invoice.customer_name);
    y -= 14.0;
    page.text(MARGIN, y, 10.0, Font::Regular, &invoice.customer_email);

    y = y.min(meta_y) - 36.0;
    page.text(MARGIN, y, 10.0, Font::Bold, "Beskrivning");
    page.text_right(360.0, y, 10.0, Font::Bold, "Antal");
    page.text_right(450.0, y, 10.0, Font::Bold, "À-pris");
    page.text_right(right, y, 10.0, Font::Bold, "Belopp");
    y -= 6.0;
    page.line(MARGIN, y, right, y, 0.8);

    for line in lines {
        y -= 16.0;
        page.text(MARGIN, y, 10.0, Font::Regular, &line.description);
        page.text_right(360.0, y, 10.0, Font::Regular, &line.quantity.to_string());
        page.text_right(450.0, y, 10.0, Font::Regular, &format_sek(line.unit_price_ore));
        page.text_right(right, y, 10.0, Font::Regular, &format_sek(line.total_ore()));
    }

    y -= 10.0;
    page.line(MARGIN, y, right, y, 0.8);
    y -= 18.0;
    page.text(330.0, y, 12.0, Font::Bold, "Att betala");
    page.text_right(right, y, 12.0, Font::Bold, &format_sek(payment.amount_ore));
    y -= 14.0;
    page.text(330.0, y, 9.0, Font::Regular, "Varav moms ingår enligt gällande sats");

    y -= 50.0;
    page.text(
        MARGIN,
        y,
        10.0,
        Font::Regular,
        &format!(
            "Betala till bankgiro {} senast {}.",
            studio.bankgiro,
            invoice.due_date.format("%Y-%m-%d")
        ),
    );
    y -= 14.0;
    page.text(
        MARGIN,
        y,
        10.0,
        Font::Regular,
        &format!("Ange referens {} vid betalning.", payment.reference),
    );

    page.to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::domain::{PaymentKind, PaymentMethod, PaymentStatus};
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    #[test]
    fn test_invoice_contains_key_fields() {
        let now = Utc::now();
        let payment = Payment {
            id: Uuid::new_v4(),
            reference: "BQ7K2MZ4R".to_string(),
            kind: PaymentKind::Booking,
            subject_id: Uuid::new_v4(),
            method: PaymentMethod::Invoice,
            amount_ore: 190_000,
            currency: "SEK".to_string(),
            status: PaymentStatus::Created,
            provider_id: None,
            payer_alias: None,
            idempotency_key: None,
            error_message: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };
        let invoice = Invoice {
            id: Uuid::new_v4(),
            payment_id: payment.id,
            invoice_number: 1001,
            customer_name: "Sven Berg".to_string(),
            customer_email: "sven@example.se".to_string(),
            due_date: NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
            pdf_path: None,
            sent_at: None,
            created_at: now,
        };
        let lines = vec![InvoiceLine {
            description: "Drejkurs helg".to_string(),
            quantity: 2,
            unit_price_ore: 95_000,
        }];

        let bytes = render_invoice(&Settings::default().studio, &invoice, &payment, &lines);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("(1001)"));
        assert!(text.contains("(BQ7K2MZ4R)"));
        assert!(text.contains("(1 900 kr)"));
        assert!(text.contains("2026-04-01"));
    }
}
