//! Text composed for debtors and for the gateway's payment records.

use super::installment::InstallmentRecord;
use chrono::{DateTime, Local, Utc};

/// The two parts of a reminder, sent in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Human-readable reminder with amount and redemption instructions.
    pub details: String,
    /// The bare redeemable code, sent alone so it can be copied in one tap.
    pub code: String,
}

pub fn payment_description(record: &InstallmentRecord, overdue: bool) -> String {
    let mut description = format!(
        "Installment {} - Contract {}",
        record.installment.sequence, record.installment.contract_id
    );
    if overdue {
        description.push_str(" (OVERDUE)");
    }
    description
}

/// Reference echoed back by the gateway so its records trace to our contract.
pub fn external_reference(record: &InstallmentRecord, overdue: bool) -> String {
    let mut reference = format!(
        "CONTRACT_{}_INSTALLMENT_{}",
        record.installment.contract_id, record.installment.sequence
    );
    if overdue {
        reference.push_str("_OVERDUE");
    }
    reference
}

pub fn compose_notice(record: &InstallmentRecord, pix_code: &str) -> Notice {
    let details = format!(
        "Hello {name},\n\
         installment {seq} of your contract is still open.\n\
         Original amount: R$ {amount}\n\n\
         To avoid interest and late fees, please settle it as soon as possible.\n\n\
         How to pay\n\
         1. Open your banking app\n\
         2. Choose the PIX option\n\
         3. Choose \"PIX copy and paste\"\n\
         4. Paste the code sent in the next message\n\
         5. Confirm the payment",
        name = record.customer.name,
        seq = record.installment.sequence,
        amount = record.installment.amount,
    );
    Notice {
        details,
        code: pix_code.to_string(),
    }
}

pub fn compose_confirmation(record: &InstallmentRecord, paid_at: DateTime<Utc>) -> String {
    let paid_on = paid_at.with_timezone(&Local).date_naive();
    format!(
        "*PAYMENT CONFIRMED*\n\n\
         Hello {name},\n\n\
         The payment of your installment has been confirmed.\n\n\
         *Payment details:*\n\
         - Contract: {contract}\n\
         - Installment: {seq}\n\
         - Amount: R$ {amount}\n\
         - Due date: {due}\n\
         - Payment date: {paid}\n\n\
         Thank you. If you need anything else, we are at your disposal.\n\n\
         Collections Team",
        name = record.customer.name,
        contract = record.installment.contract_id,
        seq = record.installment.sequence,
        amount = record.installment.amount,
        due = record.installment.due_date.format("%d/%m/%Y"),
        paid = paid_on.format("%d/%m/%Y"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::customer::{Contract, Customer};
    use crate::domain::installment::Installment;
    use crate::domain::money::Amount;
    use chrono::{NaiveDate, TimeZone};
    use rust_decimal_macros::dec;

    fn record() -> InstallmentRecord {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        InstallmentRecord {
            installment: Installment::new(
                10,
                42,
                3,
                Amount::new(dec!(150)).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
                created,
            ),
            contract: Contract {
                id: 42,
                customer_id: 5,
            },
            customer: Customer {
                id: 5,
                name: "Ana Souza".to_string(),
                phone: "(11) 98888-7777".to_string(),
                tax_id: "52998224725".to_string(),
                email: "ana@example.com".to_string(),
            },
        }
    }

    #[test]
    fn test_description_and_reference_markers() {
        let r = record();
        assert_eq!(payment_description(&r, false), "Installment 3 - Contract 42");
        assert_eq!(
            payment_description(&r, true),
            "Installment 3 - Contract 42 (OVERDUE)"
        );
        assert_eq!(external_reference(&r, false), "CONTRACT_42_INSTALLMENT_3");
        assert_eq!(external_reference(&r, true), "CONTRACT_42_INSTALLMENT_3_OVERDUE");
    }

    #[test]
    fn test_notice_parts() {
        let notice = compose_notice(&record(), "00020126abc");
        assert!(notice.details.starts_with("Hello Ana Souza,"));
        assert!(notice.details.contains("installment 3"));
        assert!(notice.details.contains("R$ 150.00"));
        assert_eq!(notice.code, "00020126abc");
    }

    #[test]
    fn test_confirmation_mentions_contract_and_amount() {
        let paid_at = Utc.with_ymd_and_hms(2024, 3, 12, 12, 0, 0).unwrap();
        let text = compose_confirmation(&record(), paid_at);
        assert!(text.contains("Contract: 42"));
        assert!(text.contains("Installment: 3"));
        assert!(text.contains("R$ 150.00"));
        assert!(text.contains("Due date: 10/03/2024"));
    }
}
