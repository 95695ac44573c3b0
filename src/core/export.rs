//! CSV export of a user's records, in their original currencies.
use crate::core::error::{FxError, FxResult};
use crate::core::ledger::{
    DateRange, Language, LedgerSource, RecordFilter, SettingsSource, UserId, validate_user,
};
use csv::WriterBuilder;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// UTF-8 byte order mark, so spreadsheet tools detect the encoding.
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Column headers in the user's interface language. Unknown languages use English.
pub fn headers(language: Option<Language>) -> [&'static str; 6] {
    match language {
        Some(Language::Mk) => [
            "Начин на плаќање",
            "Категорија",
            "Износ",
            "Валута",
            "Датум",
            "Опис",
        ],
        Some(Language::En) | None => [
            "Payment Method",
            "Category",
            "Amount",
            "Currency",
            "Date",
            "Description",
        ],
    }
}

pub struct RecordExporter {
    ledger: Arc<dyn LedgerSource>,
    settings: Arc<dyn SettingsSource>,
}

impl RecordExporter {
    pub fn new(ledger: Arc<dyn LedgerSource>, settings: Arc<dyn SettingsSource>) -> Self {
        Self { ledger, settings }
    }

    /// Newest-first CSV of the user's records within `range`.
    #[instrument(name = "ExportCsv", skip(self))]
    pub async fn export_records_csv(&self, user_id: UserId, range: DateRange) -> FxResult<Vec<u8>> {
        validate_user(user_id)?;
        let language = Language::from_code(&self.settings.language_preference(user_id).await?);

        let categories: HashMap<u64, String> = self
            .ledger
            .list_categories(user_id)
            .await?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();
        let payment_methods: HashMap<u64, String> = self
            .ledger
            .list_payment_methods(user_id)
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();

        let filter = RecordFilter {
            range,
            ..Default::default()
        };
        let records = self.ledger.list_records(user_id, &filter).await?;
        debug!(records = records.len(), ?language, "Exporting records");

        let mut writer = WriterBuilder::new().from_writer(UTF8_BOM.to_vec());
        writer.write_record(headers(language))?;
        for record in &records {
            let amount = format!("{:.2}", record.amount);
            let date = record.date.format("%Y-%m-%d").to_string();
            writer.write_record([
                payment_methods
                    .get(&record.payment_method_id)
                    .map_or("", String::as_str),
                categories.get(&record.category_id).map_or("", String::as_str),
                amount.as_str(),
                record.currency.code(),
                date.as_str(),
                record.description.as_deref().unwrap_or(""),
            ])?;
        }

        writer
            .into_inner()
            .map_err(|e| FxError::Export(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::currency::Currency;
    use crate::core::ledger::{Category, CategoryType, PaymentMethod, Record, UserSettings};
    use async_trait::async_trait;
    use chrono::NaiveDate;

    struct MockLedger {
        language: String,
        records: Vec<Record>,
    }

    #[async_trait]
    impl LedgerSource for MockLedger {
        async fn list_records(&self, _user: UserId, filter: &RecordFilter) -> FxResult<Vec<Record>> {
            let mut records: Vec<Record> = self
                .records
                .iter()
                .filter(|r| filter.matches(r))
                .cloned()
                .collect();
            records.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
            Ok(records)
        }

        async fn list_categories(&self, _user: UserId) -> FxResult<Vec<Category>> {
            Ok(vec![Category {
                id: 1,
                name: "Food".to_string(),
                category_type: CategoryType::Expense,
                color: None,
            }])
        }

        async fn list_payment_methods(&self, _user: UserId) -> FxResult<Vec<PaymentMethod>> {
            Ok(vec![PaymentMethod {
                id: 1,
                name: "Cash".to_string(),
            }])
        }
    }

    #[async_trait]
    impl SettingsSource for MockLedger {
        async fn settings(&self, _user: UserId) -> FxResult<UserSettings> {
            Ok(UserSettings {
                currency: Currency::Mkd,
                language: self.language.clone(),
            })
        }
    }

    fn record(id: u64, amount: f64, currency: Currency, date: &str, pm: u64) -> Record {
        Record {
            id,
            amount,
            currency,
            category_id: 1,
            payment_method_id: pm,
            date: date.parse::<NaiveDate>().unwrap(),
            description: Some(format!("note {id}")),
        }
    }

    fn exporter(language: &str, records: Vec<Record>) -> RecordExporter {
        let ledger = Arc::new(MockLedger {
            language: language.to_string(),
            records,
        });
        RecordExporter::new(ledger.clone(), ledger)
    }

    #[tokio::test]
    async fn test_export_rows_in_original_currency() {
        let exporter = exporter(
            "EN",
            vec![
                record(1, 100.0, Currency::Mkd, "2025-01-05", 1),
                record(2, 50.0, Currency::Eur, "2025-01-06", 1),
            ],
        );

        let bytes = exporter
            .export_records_csv(1, DateRange::default())
            .await
            .unwrap();
        assert!(bytes.starts_with(UTF8_BOM));

        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Payment Method,Category,Amount,Currency,Date,Description",
                "Cash,Food,50.00,EUR,2025-01-06,note 2",
                "Cash,Food,100.00,MKD,2025-01-05,note 1",
            ]
        );
    }

    #[tokio::test]
    async fn test_export_localized_headers() {
        let bytes = exporter("mk", vec![])
            .export_records_csv(1, DateRange::default())
            .await
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("Начин на плаќање,Категорија,Износ,Валута,Датум,Опис"));
    }

    #[tokio::test]
    async fn test_export_unknown_language_and_missing_names() {
        let bytes = exporter("FR", vec![record(3, 9.999, Currency::Usd, "2025-02-01", 42)])
            .export_records_csv(1, DateRange::default())
            .await
            .unwrap();
        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Payment Method,Category,Amount,Currency,Date,Description");
        assert_eq!(lines[1], ",Food,10.00,USD,2025-02-01,note 3");
    }

    #[tokio::test]
    async fn test_export_respects_range() {
        let range = DateRange::new(
            Some("2025-01-06".parse().unwrap()),
            Some("2025-01-31".parse().unwrap()),
        )
        .unwrap();
        let bytes = exporter(
            "EN",
            vec![
                record(1, 100.0, Currency::Mkd, "2025-01-05", 1),
                record(2, 50.0, Currency::Eur, "2025-01-06", 1),
            ],
        )
        .export_records_csv(1, range)
        .await
        .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(!text.contains("MKD"));
    }

    #[tokio::test]
    async fn test_export_rejects_zero_user() {
        let err = exporter("EN", vec![])
            .export_records_csv(0, DateRange::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FxError::InvalidInput(_)));
    }
}
