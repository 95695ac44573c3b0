use super::ui;
use crate::core::aggregation::{Aggregator, Summary, SummaryQuery};
use crate::core::ledger::UserId;
use anyhow::{Context, Result};

impl Summary {
    pub fn display(&self) -> String {
        ui::format_total("Balance", self.amount, self.currency.code())
    }
}

pub async fn run(aggregator: &Aggregator, user_id: UserId, query: &SummaryQuery) -> Result<()> {
    let summary = aggregator
        .get_summary(user_id, query)
        .await
        .with_context(|| format!("Failed to compute summary for user {user_id}"))?;
    println!("{}", summary.display());
    Ok(())
}
