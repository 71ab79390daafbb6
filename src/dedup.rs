use crate::AccrualRecord;
use chrono::NaiveDate;
use log::debug;
use std::collections::BTreeMap;

/// Collapses records describing the same institution twice in one accounting
/// month, e.g. a partial-deployment and a full-deployment row for the same
/// school.
///
/// Each accounting month is handled on its own. Within a month records are
/// ordered by deployment status (partial before full) and then by the order
/// they were encountered; the last record per entity id wins. Survivors are
/// returned month by month, ascending, in encounter order.
pub fn dedupe(records: &[AccrualRecord]) -> Vec<AccrualRecord> {
    let mut partitions: BTreeMap<NaiveDate, Vec<(usize, &AccrualRecord)>> = BTreeMap::new();
    for (idx, record) in records.iter().enumerate() {
        partitions
            .entry(record.accounting_month)
            .or_default()
            .push((idx, record));
    }

    let mut survivors = Vec::with_capacity(records.len());
    for (month, mut partition) in partitions {
        let kept = dedupe_partition(&mut partition);
        if kept.len() < partition.len() {
            debug!(
                "Accounting month {}: dropped {} duplicate records",
                month.format("%Y-%m"),
                partition.len() - kept.len()
            );
        }
        survivors.extend(kept);
    }

    survivors
}

fn dedupe_partition(partition: &mut [(usize, &AccrualRecord)]) -> Vec<AccrualRecord> {
    partition.sort_by_key(|(idx, record)| (record.source.deployment, *idx));

    let mut winners: BTreeMap<&str, (usize, &AccrualRecord)> = BTreeMap::new();
    for (idx, record) in partition.iter() {
        winners.insert(record.source.entity_id.as_str(), (*idx, *record));
    }

    let mut kept: Vec<(usize, &AccrualRecord)> = winners.into_values().collect();
    kept.sort_by_key(|(idx, _)| *idx);
    kept.into_iter().map(|(_, record)| record.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::SourceRecord;
    use crate::schema::{Cadence, DeploymentStatus, RecordKind};
    use crate::AccrualStatus;
    use std::sync::Arc;

    fn month(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn record(
        entity_id: &str,
        deployment: DeploymentStatus,
        accounting_month: NaiveDate,
        quantity: i64,
    ) -> AccrualRecord {
        AccrualRecord {
            source: Arc::new(SourceRecord {
                kind: RecordKind::Opportunity,
                entity_id: entity_id.to_string(),
                entity_name: format!("{} school", entity_id),
                owner: "aaaa".to_string(),
                cadence: Cadence::Monthly,
                anchor_date: month(2023, 1),
                quantity,
                rate: 100,
                probability: Some(100),
                mrr: quantity * 100,
                deployment,
            }),
            accounting_month,
            status: AccrualStatus::Forecast,
            fiscal_year: 2022,
            amount: quantity * 100,
        }
    }

    #[test]
    fn test_full_wins_over_partial_regardless_of_order() {
        let jan = month(2023, 1);
        let input = vec![
            record("E1", DeploymentStatus::Full, jan, 10),
            record("E1", DeploymentStatus::Partial, jan, 3),
        ];

        let output = dedupe(&input);
        assert_eq!(output.len(), 1);
        assert_eq!(output[0].source.deployment, DeploymentStatus::Full);
        assert_eq!(output[0].amount, 1000);

        let reversed: Vec<AccrualRecord> = input.into_iter().rev().collect();
        let output = dedupe(&reversed);
        assert_eq!(output.len(), 1);
        assert_eq!(output[0].source.deployment, DeploymentStatus::Full);
    }

    #[test]
    fn test_same_status_keeps_later_record() {
        let jan = month(2023, 1);
        let input = vec![
            record("E1", DeploymentStatus::Partial, jan, 1),
            record("E1", DeploymentStatus::Partial, jan, 2),
        ];

        let output = dedupe(&input);
        assert_eq!(output.len(), 1);
        assert_eq!(output[0].source.quantity, 2);
    }

    #[test]
    fn test_dedup_is_scoped_per_accounting_month() {
        let input = vec![
            record("E1", DeploymentStatus::Partial, month(2023, 1), 1),
            record("E1", DeploymentStatus::Full, month(2023, 2), 5),
            record("E2", DeploymentStatus::Partial, month(2023, 1), 7),
        ];

        let output = dedupe(&input);
        assert_eq!(output.len(), 3);
        assert_eq!(output[0].accounting_month, month(2023, 1));
        assert_eq!(output[0].source.entity_id, "E1");
        assert_eq!(output[1].source.entity_id, "E2");
        assert_eq!(output[2].accounting_month, month(2023, 2));
    }

    #[test]
    fn test_input_is_left_untouched() {
        let jan = month(2023, 1);
        let input = vec![
            record("E1", DeploymentStatus::Partial, jan, 1),
            record("E1", DeploymentStatus::Full, jan, 2),
        ];

        let _ = dedupe(&input);
        assert_eq!(input.len(), 2);
        assert_eq!(input[0].source.deployment, DeploymentStatus::Partial);
    }

    #[test]
    fn test_empty_input() {
        assert!(dedupe(&[]).is_empty());
    }
}
