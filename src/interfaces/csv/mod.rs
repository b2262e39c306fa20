pub mod installment_reader;
