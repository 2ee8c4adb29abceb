//! Customer CSV export

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::models::CustomerExportRow;

pub const CUSTOMER_CSV_HEADER: &str =
    "First Name,Last Name,Email,Phone Number,City,Number of Cars,Created At";

/// Quote a field when it contains a delimiter, quote or line break
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

pub fn customers_csv(rows: &[CustomerExportRow]) -> String {
    let mut csv = String::from(CUSTOMER_CSV_HEADER);
    csv.push('\n');
    for row in rows {
        let fields = [
            escape(&row.first_name),
            escape(&row.last_name),
            escape(row.email.as_deref().unwrap_or_default()),
            escape(&row.phone_number),
            escape(row.city.as_deref().unwrap_or_default()),
            row.car_count.to_string(),
            row.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ];
        csv.push_str(&fields.join(","));
        csv.push('\n');
    }
    csv
}

/// The CSV document, base64-encoded for transport as a GraphQL string
pub fn customers_csv_base64(rows: &[CustomerExportRow]) -> String {
    STANDARD.encode(customers_csv(rows).as_bytes())
}
