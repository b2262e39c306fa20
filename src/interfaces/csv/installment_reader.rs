use crate::domain::customer::{Contract, ContractId, Customer, CustomerId, InstallmentId};
use crate::domain::installment::{Installment, InstallmentRecord};
use crate::domain::money::Amount;
use crate::error::{ReconcileError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One provisioning row: an installment with its contract and customer flattened in.
#[derive(Debug, Deserialize)]
struct InstallmentRow {
    installment_id: InstallmentId,
    contract_id: ContractId,
    customer_id: CustomerId,
    sequence: u32,
    amount: Decimal,
    due_date: NaiveDate,
    payment_id: Option<String>,
    note: Option<String>,
    customer_name: String,
    phone: String,
    tax_id: String,
    email: String,
}

impl InstallmentRow {
    fn into_record(self, imported_at: DateTime<Utc>) -> Result<InstallmentRecord> {
        let amount = Amount::new(self.amount).map_err(|_| {
            ReconcileError::ValidationError(format!(
                "installment {} has non-positive amount {}",
                self.installment_id, self.amount
            ))
        })?;
        let mut installment = Installment::new(
            self.installment_id,
            self.contract_id,
            self.sequence,
            amount,
            self.due_date,
            imported_at,
        );
        if let Some(payment_id) = self.payment_id.filter(|p| !p.is_empty()) {
            installment.attach_payment(payment_id, imported_at);
        }
        installment.note = self.note.filter(|n| !n.is_empty());

        Ok(InstallmentRecord {
            installment,
            contract: Contract {
                id: self.contract_id,
                customer_id: self.customer_id,
            },
            customer: Customer {
                id: self.customer_id,
                name: self.customer_name,
                phone: self.phone,
                tax_id: self.tax_id,
                email: self.email,
            },
        })
    }
}

/// Reads pending installments from a CSV source.
///
/// This reader wraps `csv::Reader` and provides an iterator over
/// `Result<InstallmentRecord>`. It handles whitespace trimming and flexible
/// record lengths automatically.
pub struct InstallmentReader<R: Read> {
    reader: csv::Reader<R>,
    imported_at: DateTime<Utc>,
}

impl<R: Read> InstallmentReader<R> {
    /// Creates a new `InstallmentReader` from any `Read` source (e.g., File, Stdin).
    ///
    /// `imported_at` becomes the creation timestamp of every record read.
    pub fn new(source: R, imported_at: DateTime<Utc>) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self {
            reader,
            imported_at,
        }
    }

    /// Returns an iterator that lazily reads and validates records.
    pub fn records(self) -> impl Iterator<Item = Result<InstallmentRecord>> {
        let imported_at = self.imported_at;
        self.reader
            .into_deserialize::<InstallmentRow>()
            .map(move |row| row.map_err(ReconcileError::from)?.into_record(imported_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    const HEADER: &str = "installment_id,contract_id,customer_id,sequence,amount,due_date,payment_id,note,customer_name,phone,tax_id,email";

    fn imported_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_reader_valid_stream() {
        let data = format!(
            "{HEADER}\n\
             1, 10, 100, 1, 150.00, 2024-05-10, , , Ana Souza, 11988887777, 52998224725, ana@example.com\n\
             2, 10, 100, 2, 150.00, 2024-06-10, 987654, first try failed, Ana Souza, 11988887777, 52998224725, ana@example.com"
        );
        let reader = InstallmentReader::new(data.as_bytes(), imported_at());
        let results: Vec<Result<InstallmentRecord>> = reader.records().collect();

        assert_eq!(results.len(), 2);
        let first = results[0].as_ref().unwrap();
        assert_eq!(first.installment.id, 1);
        assert_eq!(first.installment.amount.value(), dec!(150.00));
        assert_eq!(first.installment.due_date, NaiveDate::from_ymd_opt(2024, 5, 10).unwrap());
        assert!(first.installment.payment_id().is_none());
        assert_eq!(first.customer.name, "Ana Souza");
        assert_eq!(first.contract.customer_id, 100);

        let second = results[1].as_ref().unwrap();
        assert_eq!(second.installment.payment_id(), Some("987654"));
        assert_eq!(second.installment.note.as_deref(), Some("first try failed"));
    }

    #[test]
    fn test_reader_malformed_lines() {
        let data = format!(
            "{HEADER}\n\
             x, 10, 100, 1, 150.00, 2024-05-10, , , Ana, 1, 2, a@b.c\n\
             3, 10, 100, 1, -5, 2024-05-10, , , Ana, 1, 2, a@b.c\n\
             4, 10, 100, 1, 20, not-a-date, , , Ana, 1, 2, a@b.c"
        );
        let reader = InstallmentReader::new(data.as_bytes(), imported_at());
        let results: Vec<Result<InstallmentRecord>> = reader.records().collect();

        assert_eq!(results.len(), 3);
        assert!(matches!(results[0], Err(ReconcileError::CsvError(_))));
        assert!(matches!(results[1], Err(ReconcileError::ValidationError(_))));
        assert!(matches!(results[2], Err(ReconcileError::CsvError(_))));
    }
}
