//! Terminal messages.
//!
//! Status messages go to stderr; stdout carries only command output and
//! explicitly requested data.

use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

pub fn info(msg: &str) {
    eprintln!("{} {}", "info:".blue().bold(), msg);
}

pub fn success(msg: &str) {
    eprintln!("{} {}", "ok:".green().bold(), msg);
}

pub fn warn(msg: &str) {
    eprintln!("{} {}", "*WARN*:".yellow().bold(), msg);
}

pub fn error(msg: &str) {
    eprintln!("{} {}", "error:".red().bold(), msg);
}

pub fn hint(msg: &str) {
    eprintln!("  {} {}", "hint:".cyan(), msg);
}

/// Print a section header.
pub fn section(title: &str) {
    println!("\n{}", title.bold().underline());
}

/// Print rows as a table on stdout.
pub fn print_table<T: Tabled>(rows: &[T]) {
    if rows.is_empty() {
        println!("  (none)");
        return;
    }
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", table);
}
