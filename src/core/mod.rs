// Core query pipeline: resolve -> select split -> filter -> paginate, plus unique values.
pub mod error;
pub mod filter;
pub mod page;
pub mod source;
pub mod split;
pub mod table;
pub mod unique;
