use crate::application::billing::InvoiceView;
use crate::error::Result;
use std::io::Write;

/// Writes the invoice summary table printed at the end of a replay.
pub struct InvoiceWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> InvoiceWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_invoices(&mut self, invoices: &[InvoiceView]) -> Result<()> {
        self.writer.write_record([
            "invoice", "job_card", "base", "labor", "tax", "total", "status", "method",
        ])?;
        for invoice in invoices {
            self.writer.write_record([
                invoice.invoice_number.clone(),
                invoice.job_card_id.to_string(),
                invoice.base_amount.to_string(),
                invoice.labor_cost.to_string(),
                invoice.tax_amount.to_string(),
                invoice.total_amount.to_string(),
                invoice.payment_status.to_string(),
                invoice
                    .payment_method
                    .map(|m| m.to_string())
                    .unwrap_or_default(),
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
