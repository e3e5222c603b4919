//! Deferred work stored in `background_jobs`: emails, PDFs and seat counts.
//!
//! Jobs are claimed one at a time with an atomic UPDATE, so overlapping
//! cron calls and the in-process poller never run the same job twice.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use serde::Serialize;

use crate::{
    documents::{render_gift_card, render_invoice, InvoiceLine},
    domain::{BackgroundJob, BatchReport, JobPayload, PaymentKind, retry_backoff},
    email::{messages, OutgoingEmail},
    error::{AppError, Result},
    service::ServiceContext,
};

/// What one cron tick did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CronReport {
    pub recovered_jobs: u64,
    pub expired_payments: usize,
    pub expired_gift_cards: u64,
    pub removed_sessions: u64,
    pub batch: BatchReport,
}

pub struct JobRunner {
    ctx: Arc<ServiceContext>,
}

impl JobRunner {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    /// Claims and runs up to `limit` due jobs, one after another.
    pub async fn process_batch(&self, limit: i64) -> Result<BatchReport> {
        let mut report = BatchReport::default();

        for _ in 0..limit.max(0) {
            let Some(job) = self.ctx.job_repo.claim_next().await? else {
                break;
            };
            report.processed += 1;

            match self.run(&job).await {
                Ok(()) => {
                    self.ctx.job_repo.mark_completed(job.id).await?;
                    report.succeeded += 1;
                    tracing::debug!(job_id = %job.id, job_type = job.payload.job_type(), "Job completed");
                }
                Err(e) => {
                    report.failed += 1;
                    let retry_at = (job.attempts < job.max_attempts)
                        .then(|| Utc::now() + retry_backoff(job.attempts));
                    if retry_at.is_some() {
                        tracing::warn!(
                            job_id = %job.id,
                            job_type = job.payload.job_type(),
                            attempts = job.attempts,
                            "Job failed, will retry: {}",
                            e
                        );
                    } else {
                        tracing::error!(
                            job_id = %job.id,
                            job_type = job.payload.job_type(),
                            attempts = job.attempts,
                            "Job failed permanently: {}",
                            e
                        );
                    }
                    self.ctx.job_repo.mark_failed(job.id, &e.to_string(), retry_at).await?;
                }
            }
        }

        if report.processed > 0 {
            tracing::info!(
                processed = report.processed,
                succeeded = report.succeeded,
                failed = report.failed,
                "Job batch finished"
            );
        }
        Ok(report)
    }

    async fn run(&self, job: &BackgroundJob) -> Result<()> {
        match &job.payload {
            JobPayload::SendBookingConfirmation { booking_id } => {
                self.send_booking_confirmation(*booking_id).await
            }
            JobPayload::SendOrderConfirmation { order_id } => self.send_order_confirmation(*order_id).await,
            JobPayload::GenerateGiftCardPdf { gift_card_id } => self.generate_gift_card_pdf(*gift_card_id).await,
            JobPayload::SendGiftCard { gift_card_id } => self.send_gift_card(*gift_card_id).await,
            JobPayload::GenerateInvoice { invoice_id } => self.generate_invoice(*invoice_id).await,
            JobPayload::SendInvoice { invoice_id } => self.send_invoice(*invoice_id).await,
            JobPayload::RecountParticipants { course_instance_id } => {
                let count = self.ctx.course_repo.recount_participants(*course_instance_id).await?;
                tracing::debug!(course_instance_id = %course_instance_id, count, "Participants recounted");
                Ok(())
            }
        }
    }

    async fn send_booking_confirmation(&self, booking_id: uuid::Uuid) -> Result<()> {
        let booking = self
            .ctx
            .booking_repo
            .find_by_id(booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Booking {} not found", booking_id)))?;
        let instance = self
            .ctx
            .course_repo
            .find_instance(booking.course_instance_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Course date not found".to_string()))?;
        let template = self
            .ctx
            .course_repo
            .find_template(instance.template_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;

        let total_ore = template.price_ore * i64::from(booking.participants);
        let email = messages::booking_confirmation(&self.ctx.app_config.studio, &booking, &instance, &template, total_ore);
        self.send_with_admin_copy(email).await
    }

    async fn send_order_confirmation(&self, order_id: uuid::Uuid) -> Result<()> {
        let order = self
            .ctx
            .order_repo
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))?;
        let product = self
            .ctx
            .product_repo
            .find_by_id(order.product_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

        let email = messages::order_confirmation(&self.ctx.app_config.studio, &order, &product);
        self.send_with_admin_copy(email).await
    }

    async fn generate_gift_card_pdf(&self, gift_card_id: uuid::Uuid) -> Result<()> {
        let card = self
            .ctx
            .gift_card_repo
            .find_by_id(gift_card_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Gift card {} not found", gift_card_id)))?;

        let bytes = render_gift_card(&self.ctx.app_config.studio, &card);
        let path = self
            .ctx
            .documents
            .write(&format!("giftcards/presentkort-{}.pdf", card.code), &bytes)
            .await?;
        self.ctx.gift_card_repo.set_pdf_path(card.id, &path).await?;
        self.ctx
            .job_repo
            .enqueue(JobPayload::SendGiftCard { gift_card_id: card.id }, Utc::now())
            .await?;
        Ok(())
    }

    async fn send_gift_card(&self, gift_card_id: uuid::Uuid) -> Result<()> {
        let card = self
            .ctx
            .gift_card_repo
            .find_by_id(gift_card_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Gift card {} not found", gift_card_id)))?;
        if card.sent_at.is_some() {
            tracing::debug!(gift_card_id = %card.id, "Gift card already sent");
            return Ok(());
        }

        let pdf = match card.pdf_path.as_deref() {
            Some(path) => Some(self.ctx.documents.read(path).await?),
            None => None,
        };
        self.ctx
            .mailer
            .send(messages::gift_card_delivery(&self.ctx.app_config.studio, &card, pdf))
            .await?;
        self.ctx.gift_card_repo.mark_sent(card.id).await
    }

    async fn generate_invoice(&self, invoice_id: uuid::Uuid) -> Result<()> {
        let invoice = self
            .ctx
            .payment_repo
            .find_invoice(invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Invoice {} not found", invoice_id)))?;
        let payment = self
            .ctx
            .payment_repo
            .find_by_id(invoice.payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

        let lines = self.invoice_lines(payment.kind, payment.subject_id).await?;
        let bytes = render_invoice(&self.ctx.app_config.studio, &invoice, &payment, &lines);
        let path = self
            .ctx
            .documents
            .write(&format!("invoices/faktura-{}.pdf", invoice.invoice_number), &bytes)
            .await?;
        self.ctx.payment_repo.set_invoice_pdf(invoice.id, &path).await?;
        self.ctx
            .job_repo
            .enqueue(JobPayload::SendInvoice { invoice_id: invoice.id }, Utc::now())
            .await?;
        Ok(())
    }

    async fn send_invoice(&self, invoice_id: uuid::Uuid) -> Result<()> {
        let invoice = self
            .ctx
            .payment_repo
            .find_invoice(invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Invoice {} not found", invoice_id)))?;
        if invoice.sent_at.is_some() {
            tracing::debug!(invoice_id = %invoice.id, "Invoice already sent");
            return Ok(());
        }
        let path = invoice
            .pdf_path
            .as_deref()
            .ok_or_else(|| AppError::Internal(format!("Invoice {} has no PDF yet", invoice.invoice_number)))?;
        let payment = self
            .ctx
            .payment_repo
            .find_by_id(invoice.payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

        let pdf = self.ctx.documents.read(path).await?;
        let mut email = messages::invoice_delivery(&self.ctx.app_config.studio, &invoice, &payment, pdf);
        email.bcc = self.ctx.app_config.email.admin_address.clone();
        self.ctx.mailer.send(email).await?;
        self.ctx.payment_repo.mark_invoice_sent(invoice.id).await
    }

    async fn invoice_lines(&self, kind: PaymentKind, subject_id: uuid::Uuid) -> Result<Vec<InvoiceLine>> {
        match kind {
            PaymentKind::Booking => {
                let booking = self
                    .ctx
                    .booking_repo
                    .find_by_id(subject_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;
                let instance = self
                    .ctx
                    .course_repo
                    .find_instance(booking.course_instance_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Course date not found".to_string()))?;
                let template = self
                    .ctx
                    .course_repo
                    .find_template(instance.template_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;
                Ok(vec![InvoiceLine {
                    description: format!(
                        "{} {}",
                        template.title,
                        &crate::domain::format_local(instance.starts_at)[..10]
                    ),
                    quantity: booking.participants,
                    unit_price_ore: template.price_ore,
                }])
            }
            PaymentKind::ShopOrder => {
                let order = self
                    .ctx
                    .order_repo
                    .find_by_id(subject_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;
                let product = self
                    .ctx
                    .product_repo
                    .find_by_id(order.product_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;
                Ok(vec![InvoiceLine {
                    description: product.name,
                    quantity: order.quantity,
                    unit_price_ore: order.unit_price_ore,
                }])
            }
            PaymentKind::GiftCard => Err(AppError::Internal("Gift cards are never invoiced".to_string())),
        }
    }

    async fn send_with_admin_copy(&self, mut email: OutgoingEmail) -> Result<()> {
        email.bcc = self.ctx.app_config.email.admin_address.clone();
        self.ctx.mailer.send(email).await
    }
}

/// One pass of periodic maintenance followed by a job batch. Shared by the
/// cron endpoint and the in-process poller.
pub async fn run_cron_tick(ctx: Arc<ServiceContext>) -> Result<CronReport> {
    let jobs = &ctx.app_config.jobs;
    let recovered_jobs = ctx
        .job_repo
        .recover_stale(Utc::now() - Duration::minutes(jobs.stale_after_minutes))
        .await?;
    if recovered_jobs > 0 {
        tracing::warn!(recovered_jobs, "Returned stale jobs to the queue");
    }

    let expired_payments = ctx
        .fulfillment_service
        .expire_abandoned(ctx.app_config.swish.payment_timeout_minutes)
        .await?;
    let expired_gift_cards = ctx.gift_card_repo.expire_overdue().await?;
    let removed_sessions = ctx.auth_service.cleanup_expired_sessions().await?;

    let batch = JobRunner::new(ctx.clone()).process_batch(jobs.batch_size).await?;

    Ok(CronReport {
        recovered_jobs,
        expired_payments,
        expired_gift_cards,
        removed_sessions,
        batch,
    })
}

/// Runs `run_cron_tick` every `interval_secs` for the life of the process.
pub fn spawn_poller(ctx: Arc<ServiceContext>, interval_secs: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval_secs, "Job poller started");
        let mut interval = tokio::time::interval(StdDuration::from_secs(interval_secs.max(1)));
        loop {
            interval.tick().await;
            if let Err(e) = run_cron_tick(ctx.clone()).await {
                tracing::error!("Job poller tick failed: {}", e);
            }
        }
    })
}
