use super::ui;
use crate::core::aggregation::{Aggregator, Statistics, StatisticsQuery};
use crate::core::ledger::{CategoryType, UserId};
use anyhow::{Context, Result};
use comfy_table::{Cell, CellAlignment, Color};

impl Statistics {
    pub fn display_as_table(&self) -> String {
        let currency = self.currency.code();
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Category"),
            ui::header_cell("Type"),
            ui::header_cell("Color"),
            ui::header_cell("Records"),
            ui::header_cell(&format!("Total ({currency})")),
        ]);

        for stat in &self.categories {
            let type_cell = match stat.category_type {
                CategoryType::Expense => Cell::new("Expense").fg(Color::Red),
                CategoryType::Income => Cell::new("Income").fg(Color::Green),
            };
            table.add_row(vec![
                Cell::new(&stat.name),
                type_cell,
                ui::format_optional_cell(stat.color.as_deref(), str::to_string),
                Cell::new(stat.record_count).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.2}", stat.total_amount)).set_alignment(CellAlignment::Right),
            ]);
        }

        let mut output = format!(
            "{}\n\n",
            ui::style_text("Category statistics", ui::StyleType::Title)
        );
        if self.categories.is_empty() {
            output.push_str(&ui::style_text(
                "No records in the selected range",
                ui::StyleType::Subtle,
            ));
        } else {
            output.push_str(&table.to_string());
        }
        output.push_str(&format!(
            "\n\n{}: {:.2}\n{}: {:.2}\n{}",
            ui::style_text("Total income", ui::StyleType::TotalLabel),
            self.total_income,
            ui::style_text("Total expense", ui::StyleType::TotalLabel),
            self.total_expense,
            ui::format_total("Net balance", self.net_balance, currency),
        ));
        output
    }
}

pub async fn run(aggregator: &Aggregator, user_id: UserId, query: &StatisticsQuery) -> Result<()> {
    let stats = aggregator
        .get_statistics(user_id, query)
        .await
        .with_context(|| format!("Failed to compute statistics for user {user_id}"))?;
    println!("{}", stats.display_as_table());
    Ok(())
}
