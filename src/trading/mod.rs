pub mod order;

pub use order::{classify_rejection, InvestmentAccount, OrderGateway, OrderSide, OrderTicket};
