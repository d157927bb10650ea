//! Output formatting utilities

use colored::{ColoredString, Colorize};
use comfy_table::{presets::UTF8_FULL_CONDENSED, ContentArrangement, Table};
use rust_decimal::Decimal;

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Amount for display: at most two decimals, no trailing zeros
pub fn format_amount(amount: Decimal) -> String {
    amount.round_dp(2).normalize().to_string()
}

/// Net balance colored by direction: green when owed, red when owing
pub fn format_net(amount: Decimal) -> ColoredString {
    let text = format_amount(amount);
    if amount.is_sign_positive() && !amount.is_zero() {
        format!("+{}", text).green()
    } else if amount.is_sign_negative() && !amount.is_zero() {
        text.red()
    } else {
        text.normal()
    }
}
