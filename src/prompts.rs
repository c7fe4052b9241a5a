//! Every prompt the tool sends to a model.

use crate::extraction::{DocumentMetadata, Extraction};
use serde::Serialize;

/// Placeholder replaced by the serialised invoice in
/// [`INVOICE_ANALYSIS_TEMPLATE`].
pub const INVOICE_JSON_PLACEHOLDER: &str = "{invoice_json}";

/// The single user message sent to the chat model for every invoice.
///
/// Asks for a table, a summary and a financial analysis. The 5000 threshold
/// and the status phrases are matched verbatim by downstream readers.
pub const INVOICE_ANALYSIS_TEMPLATE: &str = r#"Here is the JSON representation of an invoice:

{invoice_json}

Please do the following:
1. Generate an extremely well-formatted table with all the specifics from the invoice, including the invoice number, due date, items, quantities, prices, and total amount due.
2. Include the following information:
   - If the invoice is pending to be paid, state "Status: Pending"
   - Include the extracted email address separately before the table
   - Include the extracted physical address separately before the table
   - If the invoice amount is greater than 5000, state "Requires Approval"
   - If the invoice amount is less than or equal to 5000, state "Submitted for Pass-Through Settlement"
3. Provide a detailed summary of what the invoice is about, for whom it is, and whether it requires further inquiry and processing based on the services or goods mentioned.
4. Perform a financial analysis of the invoice, including:
   - Determine if the invoice is eligible for factoring based on the due date and total amount
   - Estimate the risk associated with the invoice based on the customer's payment history and credit score (if available)
   - Provide recommendations for optimizing cash flow and minimizing risk in processing the invoice
   - Identify any potential discrepancies or red flags in the invoice that may require further investigation

Generate the financial analysis separately from the table and summary.
Do not include any other text or explanation, just the requested information."#;

/// System prompt for transcribing a rendered page that has no text layer.
pub const OCR_SYSTEM_PROMPT: &str = r#"You are an expert document transcriber. The image is one page of a business document, usually an invoice.

Follow these rules precisely:

1. TEXT PRESERVATION
   - Transcribe ALL visible text completely and accurately
   - Keep the reading order a human would use
   - Keep numbers, currency symbols, dates, and identifiers exactly as printed

2. TABLES
   - Transcribe line-item tables as GFM pipe tables, one row per line item

3. WHAT TO IGNORE
   - Decorative borders, logos without text, and background graphics

4. OUTPUT FORMAT
   - Output ONLY the transcribed text
   - Do NOT wrap in ``` fences
   - Do NOT add commentary, summaries, or explanations"#;

#[derive(Serialize)]
struct InvoicePayload<'a> {
    invoice_details: &'a str,
    metadata: &'a DocumentMetadata,
}

/// The invoice as the JSON object embedded in the analysis prompt:
/// `{"invoice_details": <text>, "metadata": <metadata>}`.
pub fn invoice_json(extraction: &Extraction) -> Result<String, serde_json::Error> {
    serde_json::to_string(&InvoicePayload {
        invoice_details: &extraction.text,
        metadata: &extraction.metadata,
    })
}

/// Render [`INVOICE_ANALYSIS_TEMPLATE`] for one extraction.
pub fn build_analysis_prompt(extraction: &Extraction) -> Result<String, serde_json::Error> {
    let json = invoice_json(extraction)?;
    Ok(INVOICE_ANALYSIS_TEMPLATE.replacen(INVOICE_JSON_PLACEHOLDER, &json, 1))
}
