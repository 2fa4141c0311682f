//! Input state management for the TUI
//!
//! Handles the input modes (normal, dialog, symbol entry) and the order
//! entry form.

use crate::error::OrderError;
use crate::trading::order::{OrderSide, OrderTicket};
use rust_decimal::Decimal;

/// Current input mode
#[derive(Debug, Clone, PartialEq)]
pub enum InputMode {
    /// Normal navigation mode
    Normal,
    /// Modal dialog is active
    Dialog(DialogType),
    /// Typing a symbol to add to the watchlist
    AddSymbol,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DialogType {
    Help,
    Order,
}

#[derive(Debug, Clone)]
pub struct InputState {
    pub mode: InputMode,
    /// Symbol being typed in `AddSymbol` mode
    pub symbol_query: String,
}

impl Default for InputState {
    fn default() -> Self {
        Self {
            mode: InputMode::Normal,
            symbol_query: String::new(),
        }
    }
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_normal(&self) -> bool {
        matches!(self.mode, InputMode::Normal)
    }

    pub fn is_dialog(&self) -> bool {
        matches!(self.mode, InputMode::Dialog(_))
    }

    pub fn enter_add_symbol(&mut self) {
        self.mode = InputMode::AddSymbol;
        self.symbol_query.clear();
    }

    /// Leaves symbol entry, returning what was typed (if anything).
    pub fn finish_add_symbol(&mut self) -> Option<String> {
        self.mode = InputMode::Normal;
        let symbol = std::mem::take(&mut self.symbol_query).trim().to_uppercase();
        (!symbol.is_empty()).then_some(symbol)
    }

    pub fn push_symbol_char(&mut self, c: char) {
        if c.is_ascii_alphanumeric() && self.symbol_query.len() < 12 {
            self.symbol_query.push(c.to_ascii_uppercase());
        }
    }

    pub fn show_help(&mut self) {
        self.mode = InputMode::Dialog(DialogType::Help);
    }

    pub fn show_order(&mut self) {
        self.mode = InputMode::Dialog(DialogType::Order);
    }

    pub fn close_dialog(&mut self) {
        self.mode = InputMode::Normal;
    }
}

/// State for the order entry dialog
#[derive(Debug, Clone)]
pub struct OrderDialogState {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: String,
    pub focused_field: OrderDialogField,
    pub error_message: Option<String>,
    /// An execution is in flight; the form is locked until it resolves
    pub submitting: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderDialogField {
    Quantity,
    Submit,
    Cancel,
}

impl OrderDialogField {
    pub fn next(self) -> Self {
        match self {
            OrderDialogField::Quantity => OrderDialogField::Submit,
            OrderDialogField::Submit => OrderDialogField::Cancel,
            OrderDialogField::Cancel => OrderDialogField::Quantity,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            OrderDialogField::Quantity => OrderDialogField::Cancel,
            OrderDialogField::Submit => OrderDialogField::Quantity,
            OrderDialogField::Cancel => OrderDialogField::Submit,
        }
    }
}

impl OrderDialogState {
    pub fn new(symbol: &str, side: OrderSide) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            quantity: String::new(),
            focused_field: OrderDialogField::Quantity,
            error_message: None,
            submitting: false,
        }
    }

    pub fn toggle_side(&mut self) {
        self.side = self.side.toggle();
    }

    pub fn focus_next(&mut self) {
        self.focused_field = self.focused_field.next();
    }

    pub fn focus_prev(&mut self) {
        self.focused_field = self.focused_field.prev();
    }

    /// Whole units only, the backend does not take fractional quantities.
    pub fn push_digit(&mut self, c: char) {
        if c.is_ascii_digit() && self.quantity.len() < 9 {
            self.quantity.push(c);
            self.clear_error();
        }
    }

    pub fn pop_digit(&mut self) {
        self.quantity.pop();
        self.clear_error();
    }

    pub fn parsed_quantity(&self) -> i64 {
        self.quantity.parse().unwrap_or(0)
    }

    /// Value of the typed quantity at `price`, for the order preview.
    pub fn estimated_total(&self, price: Decimal) -> Decimal {
        price * Decimal::from(self.parsed_quantity())
    }

    pub fn ticket(&self, account_id: u64) -> Result<OrderTicket, OrderError> {
        OrderTicket::new(account_id, &self.symbol, self.side, self.parsed_quantity())
    }

    pub fn clear_error(&mut self) {
        self.error_message = None;
    }

    pub fn set_error(&mut self, msg: &str) {
        self.error_message = Some(msg.to_string());
    }
}
