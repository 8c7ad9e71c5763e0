mod deposit_parser;

pub use deposit_parser::{parse_deposit_text, parse_deposits, ParsedDeposit};
