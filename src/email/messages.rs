//! Plain-text bodies for customer emails.

use crate::{
    config::StudioConfig,
    domain::{
        format_local, format_sek, Booking, CourseInstance, CourseTemplate, GiftCard, Invoice,
        Payment, PaymentMethod, Product, ShopOrder,
    },
    email::{Attachment, OutgoingEmail},
};

fn signature(studio: &StudioConfig) -> String {
    format!("\nVarma hälsningar,\n{}\n{}\n", studio.name, studio.email)
}

pub fn booking_confirmation(
    studio: &StudioConfig,
    booking: &Booking,
    instance: &CourseInstance,
    template: &CourseTemplate,
    total_ore: i64,
) -> OutgoingEmail {
    let payment_line = match booking.payment_method {
        PaymentMethod::Swish => "Betald med Swish.".to_string(),
        PaymentMethod::GiftCard => "Betald med presentkort.".to_string(),
        PaymentMethod::Invoice => "Faktura skickas i ett separat mejl.".to_string(),
    };

    let body = format!(
        "Hej {name}!\n\n\
         Tack för din bokning. Vi ses på kursen.\n\n\
         Kurs: {title}\n\
         Tid: {starts} - {ends}\n\
         Antal deltagare: {participants}\n\
         Summa: {total}\n\
         Bokningsnummer: {reference}\n\
         {payment_line}\n\n\
         Adress: {address}\n{signature}",
        name = booking.customer_name,
        title = template.title,
        starts = format_local(instance.starts_at),
        ends = format_local(instance.ends_at),
        participants = booking.participants,
        total = format_sek(total_ore),
        reference = booking.reference,
        payment_line = payment_line,
        address = studio.address,
        signature = signature(studio),
    );

    OutgoingEmail {
        to: booking.customer_email.clone(),
        bcc: None,
        subject: format!("Bokningsbekräftelse: {}", template.title),
        body,
        attachment: None,
    }
}

pub fn order_confirmation(studio: &StudioConfig, order: &ShopOrder, product: &Product) -> OutgoingEmail {
    let body = format!(
        "Hej {name}!\n\n\
         Tack för din beställning.\n\n\
         Produkt: {product} x {quantity}\n\
         Summa: {total}\n\
         Ordernummer: {reference}\n\n\
         Leveransadress:\n{address}\n\n\
         Vi meddelar dig när paketet har skickats.\n{signature}",
        name = order.customer_name,
        product = product.name,
        quantity = order.quantity,
        total = format_sek(order.total_ore),
        reference = order.reference,
        address = order.shipping_address,
        signature = signature(studio),
    );

    OutgoingEmail {
        to: order.customer_email.clone(),
        bcc: None,
        subject: format!("Orderbekräftelse {}", order.reference),
        body,
        attachment: None,
    }
}

pub fn gift_card_delivery(studio: &StudioConfig, card: &GiftCard, pdf: Option<Vec<u8>>) -> OutgoingEmail {
    let greeting = card
        .recipient_name
        .as_deref()
        .unwrap_or(card.buyer_name.as_str());
    let from_line = if card.recipient_email.is_some() {
        format!("Du har fått ett presentkort från {}.", card.buyer_name)
    } else {
        "Här är presentkortet du köpte.".to_string()
    };
    let message = card
        .message
        .as_deref()
        .map(|m| format!("\nHälsning:\n{}\n", m))
        .unwrap_or_default();
    let expires = card
        .expires_at
        .map(format_local)
        .unwrap_or_else(|| "-".to_string());

    let body = format!(
        "Hej {greeting}!\n\n\
         {from_line}\n{message}\n\
         Kod: {code}\n\
         Värde: {amount}\n\
         Giltigt till: {expires}\n\n\
         Ange koden när du bokar en kurs på vår webbplats.\n{signature}",
        greeting = greeting,
        from_line = from_line,
        message = message,
        code = card.code,
        amount = format_sek(card.initial_amount_ore),
        expires = expires,
        signature = signature(studio),
    );

    OutgoingEmail {
        to: card.delivery_email().to_string(),
        bcc: card
            .recipient_email
            .as_ref()
            .map(|_| card.buyer_email.clone()),
        subject: format!("Presentkort från {}", studio.name),
        body,
        attachment: pdf.map(|bytes| Attachment::pdf(format!("presentkort-{}.pdf", card.code), bytes)),
    }
}

pub fn invoice_delivery(
    studio: &StudioConfig,
    invoice: &Invoice,
    payment: &Payment,
    pdf: Vec<u8>,
) -> OutgoingEmail {
    let body = format!(
        "Hej {name}!\n\n\
         Här kommer faktura {number} på {amount}.\n\n\
         Betala till bankgiro {bankgiro} senast {due} och ange referens {reference}.\n{signature}",
        name = invoice.customer_name,
        number = invoice.invoice_number,
        amount = format_sek(payment.amount_ore),
        bankgiro = studio.bankgiro,
        due = invoice.due_date.format("%Y-%m-%d"),
        reference = payment.reference,
        signature = signature(studio),
    );

    OutgoingEmail {
        to: invoice.customer_email.clone(),
        bcc: None,
        subject: format!("Faktura {} från {}", invoice.invoice_number, studio.name),
        body,
        attachment: Some(Attachment::pdf(format!("faktura-{}.pdf", invoice.invoice_number), pdf)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::domain::GiftCardStatus;
    use chrono::Utc;
    use uuid::Uuid;

    fn card(recipient: Option<&str>) -> GiftCard {
        let now = Utc::now();
        GiftCard {
            id: Uuid::new_v4(),
            code: "ABCD-EFGH-JKMN".to_string(),
            initial_amount_ore: 50_000,
            balance_ore: 50_000,
            status: GiftCardStatus::Active,
            buyer_name: "Karin".to_string(),
            buyer_email: "karin@example.se".to_string(),
            recipient_name: recipient.map(|_| "Olle".to_string()),
            recipient_email: recipient.map(str::to_string),
            message: Some("Grattis!".to_string()),
            pdf_path: None,
            sent_at: None,
            expires_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_gift_card_goes_to_recipient_with_buyer_copy() {
        let studio = Settings::default().studio;
        let email = gift_card_delivery(&studio, &card(Some("olle@example.se")), Some(vec![1, 2, 3]));
        assert_eq!(email.to, "olle@example.se");
        assert_eq!(email.bcc.as_deref(), Some("karin@example.se"));
        assert!(email.body.contains("ABCD-EFGH-JKMN"));
        assert!(email.body.contains("500 kr"));
        let attachment = email.attachment.unwrap();
        assert_eq!(attachment.filename, "presentkort-ABCD-EFGH-JKMN.pdf");
    }

    #[test]
    fn test_gift_card_without_recipient_goes_to_buyer() {
        let studio = Settings::default().studio;
        let email = gift_card_delivery(&studio, &card(None), None);
        assert_eq!(email.to, "karin@example.se");
        assert!(email.bcc.is_none());
        assert!(email.attachment.is_none());
    }
}
