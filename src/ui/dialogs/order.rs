//! Order entry dialog for Buy/Sell

use crate::trading::order::OrderSide;
use crate::ui::dialogs::centered_rect;
use crate::ui::input::{OrderDialogField, OrderDialogState};
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Widget},
};
use rust_decimal::Decimal;

/// Order dialog widget
pub struct OrderDialog<'a> {
    state: &'a OrderDialogState,
    current_price: Option<Decimal>,
    balance: Option<Decimal>,
}

impl<'a> OrderDialog<'a> {
    pub fn new(
        state: &'a OrderDialogState,
        current_price: Option<Decimal>,
        balance: Option<Decimal>,
    ) -> Self {
        Self {
            state,
            current_price,
            balance,
        }
    }
}

impl Widget for OrderDialog<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let dialog_area = centered_rect(50, 50, area);

        // Clear background
        Clear.render(dialog_area, buf);

        let title = format!(" {} {} ", self.state.side, self.state.symbol);
        let border_color = match self.state.side {
            OrderSide::Buy => Color::Green,
            OrderSide::Sell => Color::Red,
        };

        let block = Block::default()
            .title(title)
            .title_alignment(Alignment::Center)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border_color))
            .style(Style::default().bg(Color::Black));

        let inner = block.inner(dialog_area);
        block.render(dialog_area, buf);

        // Styles
        let label_style = Style::default().fg(Color::DarkGray);
        let value_style = Style::default().fg(Color::White);
        let focused_style = Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD);
        let button_style = Style::default().fg(Color::White);
        let button_focused_style = Style::default()
            .fg(Color::Black)
            .bg(Color::Cyan)
            .add_modifier(Modifier::BOLD);

        let quantity_style = if self.state.focused_field == OrderDialogField::Quantity {
            focused_style
        } else {
            value_style
        };

        let mut lines = vec![];

        let price_text = self
            .current_price
            .map(|p| format!("R$ {:.2}", p))
            .unwrap_or_else(|| "-".to_string());
        lines.push(Line::from(vec![
            Span::styled("Market price: ", label_style),
            Span::styled(price_text, value_style),
        ]));
        lines.push(Line::from(""));

        let qty_display = if self.state.quantity.is_empty() {
            "0".to_string()
        } else {
            self.state.quantity.clone()
        };
        lines.push(Line::from(vec![
            Span::styled("Quantity:     ", label_style),
            Span::styled(
                format!("[{}]", qty_display),
                quantity_style,
            ),
            Span::styled("  ←/→ switch side", label_style),
        ]));
        lines.push(Line::from(""));

        // Executed at the backend's price, so this is only an estimate
        let total = self
            .current_price
            .map(|p| self.state.estimated_total(p))
            .unwrap_or(Decimal::ZERO);
        lines.push(Line::from(vec![
            Span::styled("Est. total:   ", label_style),
            Span::styled(format!("R$ {:.2}", total), value_style),
        ]));

        let balance_text = self
            .balance
            .map(|b| format!("R$ {:.2}", b))
            .unwrap_or_else(|| "no investment account".to_string());
        lines.push(Line::from(vec![
            Span::styled("Balance:      ", label_style),
            Span::styled(balance_text, Style::default().fg(Color::DarkGray)),
        ]));
        lines.push(Line::from(""));

        if self.state.submitting {
            lines.push(Line::from(vec![Span::styled(
                "Submitting…",
                Style::default().fg(Color::Yellow),
            )]));
            lines.push(Line::from(""));
        } else if let Some(ref error) = self.state.error_message {
            lines.push(Line::from(vec![Span::styled(
                error.as_str(),
                Style::default().fg(Color::Red),
            )]));
            lines.push(Line::from(""));
        }

        let button = |field: OrderDialogField| {
            if self.state.focused_field == field {
                button_focused_style
            } else {
                button_style
            }
        };
        let submit_text = format!(" CONFIRM {} ", self.state.side);
        lines.push(Line::from(vec![
            Span::styled("      ", label_style),
            Span::styled(" CANCEL ", button(OrderDialogField::Cancel)),
            Span::raw("    "),
            Span::styled(submit_text, button(OrderDialogField::Submit)),
        ]));

        let paragraph = Paragraph::new(lines).alignment(Alignment::Left);

        // Add some padding
        let padded = Rect {
            x: inner.x + 2,
            y: inner.y + 1,
            width: inner.width.saturating_sub(4),
            height: inner.height.saturating_sub(2),
        };

        paragraph.render(padded, buf);
    }
}
