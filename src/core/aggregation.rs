//! Currency-normalized statistics and summaries over a user's records.
use crate::core::conversion::{ConversionEngine, ConversionRequest};
use crate::core::currency::Currency;
use crate::core::error::FxResult;
use crate::core::ledger::{
    Category, CategoryType, DateRange, LedgerSource, Record, RecordFilter, SettingsSource, UserId,
    validate_user,
};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Filters for category statistics.
#[derive(Debug, Clone, Default)]
pub struct StatisticsQuery {
    pub range: DateRange,
    pub payment_method_ids: Vec<u64>,
    pub search: Option<String>,
}

/// Filters for the signed running total.
#[derive(Debug, Clone, Default)]
pub struct SummaryQuery {
    pub range: DateRange,
    pub payment_method_ids: Vec<u64>,
    pub category_id: Option<u64>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStat {
    pub category_id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub category_type: CategoryType,
    pub color: Option<String>,
    pub record_count: usize,
    pub total_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_income: f64,
    pub total_expense: f64,
    pub net_balance: f64,
    pub currency: Currency,
    pub categories: Vec<CategoryStat>,
}

impl Statistics {
    fn empty(currency: Currency) -> Self {
        Self {
            total_income: 0.0,
            total_expense: 0.0,
            net_balance: 0.0,
            currency,
            categories: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub amount: f64,
    pub currency: Currency,
}

/// Case-insensitive free-text search term. Blank terms match everything.
struct Search(Option<String>);

impl Search {
    fn new(term: Option<&str>) -> Self {
        Self(
            term.map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_lowercase),
        )
    }

    fn matches_text(&self, candidates: &[Option<&str>]) -> bool {
        match &self.0 {
            None => true,
            Some(term) => candidates
                .iter()
                .flatten()
                .any(|text| text.to_lowercase().contains(term.as_str())),
        }
    }

    /// Category name, record description, or the amount printed with two decimals.
    fn matches_record(&self, record: &Record, category: &Category) -> bool {
        let amount = format!("{:.2}", record.amount);
        self.matches_text(&[
            Some(category.name.as_str()),
            record.description.as_deref(),
            Some(amount.as_str()),
        ])
    }
}

fn conversion_requests(records: &[(&Record, &Category)]) -> Vec<ConversionRequest> {
    records
        .iter()
        .map(|(record, _)| ConversionRequest {
            record_id: record.id,
            amount: record.amount,
            currency: record.currency,
            date: record.date,
        })
        .collect()
}

/// Expenses first, then income; larger totals first within a group.
fn presentation_order(a: &CategoryStat, b: &CategoryStat) -> Ordering {
    let group = |t: CategoryType| match t {
        CategoryType::Expense => 0,
        CategoryType::Income => 1,
    };
    group(a.category_type)
        .cmp(&group(b.category_type))
        .then_with(|| b.total_amount.total_cmp(&a.total_amount))
        .then_with(|| a.category_id.cmp(&b.category_id))
}

#[derive(Default)]
struct Bucket {
    total_amount: f64,
    record_count: usize,
}

pub struct Aggregator {
    ledger: Arc<dyn LedgerSource>,
    settings: Arc<dyn SettingsSource>,
    conversion: ConversionEngine,
}

impl Aggregator {
    pub fn new(
        ledger: Arc<dyn LedgerSource>,
        settings: Arc<dyn SettingsSource>,
        conversion: ConversionEngine,
    ) -> Self {
        Self {
            ledger,
            settings,
            conversion,
        }
    }

    /// Net balance and per-category breakdown in the user's currency.
    #[instrument(name = "Statistics", skip(self, query))]
    pub async fn get_statistics(
        &self,
        user_id: UserId,
        query: &StatisticsQuery,
    ) -> FxResult<Statistics> {
        validate_user(user_id)?;
        let currency = self.settings.currency_preference(user_id).await?;

        let categories: HashMap<u64, Category> = self
            .ledger
            .list_categories(user_id)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        let filter = RecordFilter {
            range: query.range,
            payment_method_ids: query.payment_method_ids.clone(),
            ..Default::default()
        };
        let records = self.ledger.list_records(user_id, &filter).await?;
        if records.is_empty() {
            debug!("No records matched, returning empty statistics");
            return Ok(Statistics::empty(currency));
        }

        let search = Search::new(query.search.as_deref());
        let matched: Vec<(&Record, &Category)> = records
            .iter()
            .filter_map(|r| categories.get(&r.category_id).map(|c| (r, c)))
            .filter(|(r, c)| search.matches_record(r, c))
            .collect();
        if matched.is_empty() {
            debug!(records = records.len(), "All records filtered out");
            return Ok(Statistics::empty(currency));
        }

        let requests = conversion_requests(&matched);
        let rates = self.conversion.convert_batch(&requests, currency).await?;

        let mut buckets: BTreeMap<u64, Bucket> = BTreeMap::new();
        let mut total_income = 0.0;
        let mut total_expense = 0.0;
        for ((_, category), request) in matched.iter().zip(&requests) {
            let converted = rates.convert(request)?;
            let bucket = buckets.entry(category.id).or_default();
            bucket.total_amount += converted;
            bucket.record_count += 1;
            match category.category_type {
                CategoryType::Income => total_income += converted,
                CategoryType::Expense => total_expense += converted,
            }
        }

        let mut stats: Vec<CategoryStat> = buckets
            .into_iter()
            .filter_map(|(id, bucket)| {
                categories.get(&id).map(|c| CategoryStat {
                    category_id: id,
                    name: c.name.clone(),
                    category_type: c.category_type,
                    color: c.color.clone(),
                    record_count: bucket.record_count,
                    total_amount: bucket.total_amount,
                })
            })
            .collect();
        stats.sort_by(presentation_order);

        Ok(Statistics {
            total_income,
            total_expense,
            net_balance: total_income - total_expense,
            currency,
            categories: stats,
        })
    }

    /// Signed running total: income adds, expenses subtract.
    #[instrument(name = "Summary", skip(self, query))]
    pub async fn get_summary(&self, user_id: UserId, query: &SummaryQuery) -> FxResult<Summary> {
        validate_user(user_id)?;
        let currency = self.settings.currency_preference(user_id).await?;

        let filter = RecordFilter {
            range: query.range,
            payment_method_ids: query.payment_method_ids.clone(),
            category_id: query.category_id,
            ..Default::default()
        };
        let records = self.ledger.list_records(user_id, &filter).await?;
        if records.is_empty() {
            return Ok(Summary {
                amount: 0.0,
                currency,
            });
        }

        let categories: HashMap<u64, Category> = self
            .ledger
            .list_categories(user_id)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        let search = Search::new(query.search.as_deref());
        let matched: Vec<(&Record, &Category)> = records
            .iter()
            .filter_map(|r| categories.get(&r.category_id).map(|c| (r, c)))
            .filter(|(r, c)| search.matches_text(&[r.description.as_deref(), Some(c.name.as_str())]))
            .collect();

        let requests = conversion_requests(&matched);
        let rates = self.conversion.convert_batch(&requests, currency).await?;

        let mut amount = 0.0;
        for ((_, category), request) in matched.iter().zip(&requests) {
            let converted = rates.convert(request)?;
            match category.category_type {
                CategoryType::Income => amount += converted,
                CategoryType::Expense => amount -= converted,
            }
        }

        Ok(Summary { amount, currency })
    }
}
