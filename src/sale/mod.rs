//! Sale configuration reading and state evaluation

pub mod evaluator;
pub mod reader;

pub use evaluator::SaleEvaluator;
pub use reader::{decode_sale_config, read_payment_balance, SaleReader};
