//! Domain layer: installment, customer and contact-log entities, the ports the
//! application layer drives, and the pure rules (tax id checksum, message
//! composition) that need no I/O.

pub mod clock;
pub mod contact_log;
pub mod customer;
pub mod installment;
pub mod message;
pub mod money;
pub mod ports;
pub mod tax_id;
