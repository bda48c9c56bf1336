//! List command - print every stored invoice.

use clap::Args;

use idp_core::InvoiceView;
use idp_core::models::invoice::PersistedInvoice;

use super::LocalContext;

/// Arguments for the list command.
#[derive(Args)]
pub struct ListArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output, as served by the HTTP facade
    Json,
    /// CSV output with exact decimal totals
    Csv,
    /// Plain text table
    Text,
}

pub async fn run(args: ListArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let ctx = LocalContext::load(config_path)?;
    let invoices = ctx.facade().list_invoices().await?;

    let output = match args.format {
        OutputFormat::Json => format_json(&invoices)?,
        OutputFormat::Csv => format_csv(&invoices)?,
        OutputFormat::Text => format_text(&invoices),
    };
    print!("{}", output);

    Ok(())
}

fn format_json(invoices: &[PersistedInvoice]) -> anyhow::Result<String> {
    let views: Vec<InvoiceView> = invoices.iter().map(InvoiceView::from).collect();
    Ok(format!("{}\n", serde_json::to_string_pretty(&views)?))
}

fn format_csv(invoices: &[PersistedInvoice]) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record(["invoice_id", "bucket", "vendor", "total", "extraction_mode"])?;
    for invoice in invoices {
        wtr.write_record([
            invoice.invoice_id.as_str(),
            &invoice.bucket,
            &invoice.vendor,
            &invoice.total.to_string(),
            invoice.extraction_mode.as_str(),
        ])?;
    }

    Ok(String::from_utf8(wtr.into_inner()?)?)
}

fn format_text(invoices: &[PersistedInvoice]) -> String {
    if invoices.is_empty() {
        return "No invoices stored.\n".to_string();
    }

    let mut output = String::new();
    for invoice in invoices {
        output.push_str(&format!(
            "{:<48} {:<32} {:>12}  {}\n",
            invoice.invoice_id.as_str(),
            invoice.vendor,
            invoice.total.to_string(),
            invoice.extraction_mode.as_str()
        ));
    }
    output.push_str(&format!("\n{} invoice(s)\n", invoices.len()));
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use idp_core::Decimal;
    use idp_core::models::invoice::{ExtractedFields, ExtractionMode, ExtractionRecord, InvoiceId};

    fn invoice(key: &str, cents: i64) -> PersistedInvoice {
        let record = ExtractionRecord::new(
            InvoiceId::from_storage_key(key).unwrap(),
            "invoices",
            ExtractedFields {
                vendor: "Acme, Inc.".to_string(),
                total: Decimal::new(cents, 2),
                mode: ExtractionMode::Engine,
            },
        );
        PersistedInvoice::from(&record)
    }

    #[test]
    fn test_csv_keeps_exact_totals() {
        let csv = format_csv(&[invoice("a.pdf", 129999)]).unwrap();
        let mut lines = csv.lines();

        assert_eq!(lines.next(), Some("invoice_id,bucket,vendor,total,extraction_mode"));
        assert_eq!(lines.next(), Some("a.pdf,invoices,\"Acme, Inc.\",1299.99,engine"));
    }

    #[test]
    fn test_text_for_empty_store() {
        assert_eq!(format_text(&[]), "No invoices stored.\n");
    }
}
