//! Printable order receipts.
//!
//! Receipts are plain text, fixed width, one line per order line. Amounts are
//! printed in the smallest currency unit, exactly as stored.

use std::fmt::Write;

use crate::projections::OrderReadModel;

const WIDTH: usize = 40;

fn rule(out: &mut String, ch: char) {
    out.extend(std::iter::repeat_n(ch, WIDTH));
    out.push('\n');
}

fn row(out: &mut String, label: &str, value: impl std::fmt::Display) {
    let value = value.to_string();
    let pad = WIDTH.saturating_sub(label.chars().count() + value.chars().count()).max(1);
    let _ = writeln!(out, "{label}{:pad$}{value}", "");
}

fn centered(out: &mut String, text: &str) {
    let pad = WIDTH.saturating_sub(text.chars().count()) / 2;
    let _ = writeln!(out, "{:pad$}{text}", "");
}

/// Render the receipt handed to the client at intake and delivery.
pub fn render_order_receipt(shop_name: &str, order: &OrderReadModel, client_name: &str) -> String {
    let mut out = String::new();

    centered(&mut out, shop_name);
    rule(&mut out, '=');
    let _ = writeln!(out, "Order:    {}", order.order_id.0);
    let _ = writeln!(out, "Client:   {client_name}");
    let _ = writeln!(out, "Received: {}", order.received_at.format("%Y-%m-%d %H:%M"));
    if let Some(promised) = order.promised_for {
        let _ = writeln!(out, "Ready by: {}", promised.format("%Y-%m-%d %H:%M"));
    }
    let _ = writeln!(out, "Status:   {} ({:?})", order.stage, order.status);
    rule(&mut out, '-');

    for line in &order.lines {
        let amount = line.amount().unwrap_or(0);
        let _ = writeln!(out, "{}. {}", line.line_no, line.description);
        row(&mut out, &format!("   {} x {}", line.quantity, line.unit_price), amount);
    }
    rule(&mut out, '-');

    row(&mut out, "Pieces", order.total_pieces());
    row(&mut out, "Total", order.amount);
    row(&mut out, "Deposit", order.deposit);
    row(&mut out, "Paid", order.paid);
    row(&mut out, "Balance due", order.unpaid_balance());

    if let Some(notes) = &order.notes {
        rule(&mut out, '-');
        let _ = writeln!(out, "Notes: {notes}");
    }
    if let Some(reason) = &order.cancel_reason {
        let _ = writeln!(out, "Cancelled: {reason}");
    }
    rule(&mut out, '=');
    centered(&mut out, "Thank you!");
    out
}
