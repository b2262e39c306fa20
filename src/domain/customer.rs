use serde::{Deserialize, Serialize};

pub type CustomerId = u64;
pub type ContractId = u64;
pub type InstallmentId = u64;

/// The debtor behind a contract. Read-only from the engine's point of view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    /// Phone-like contact address used by the messaging channel.
    pub phone: String,
    pub tax_id: String,
    pub email: String,
}

/// First word of a full name, and the remainder, as the gateway's payer record expects.
pub fn split_full_name(name: &str) -> (&str, &str) {
    let trimmed = name.trim();
    match trimmed.split_once(char::is_whitespace) {
        Some((first, rest)) => (first, rest.trim_start()),
        None => (trimmed, ""),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub customer_id: CustomerId,
}
