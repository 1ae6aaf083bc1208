//! Derived analytics over stored results. Pure recomputation on demand;
//! nothing here is persisted.

use chrono::{Local, NaiveDate};
use serde::Serialize;

use crate::runner::{TestResult, TestStatus, TestType};

#[derive(Debug, Clone, Serialize)]
pub struct DayBucket {
    pub date: NaiveDate,
    pub passed: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeBreakdown {
    pub test_type: TestType,
    pub total: u64,
    pub passed: u64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestAnalytics {
    pub total_runs: u64,
    pub success_rate: f64,
    pub average_duration_ms: f64,
    /// Exactly 7 buckets, oldest first, ending on `today`.
    pub last_seven_days: Vec<DayBucket>,
    pub by_test_type: Vec<TypeBreakdown>,
}

fn rate(passed: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        passed as f64 / total as f64 * 100.0
    }
}

/// Compute analytics for a result list. `today` anchors the 7-day
/// histogram; callers pass the current local date.
pub fn compute(results: &[TestResult], today: NaiveDate) -> TestAnalytics {
    let total_runs = results.len() as u64;
    let passed = results
        .iter()
        .filter(|r| r.status == TestStatus::Passed)
        .count() as u64;

    let average_duration_ms = if results.is_empty() {
        0.0
    } else {
        results.iter().map(|r| r.duration_ms as f64).sum::<f64>() / results.len() as f64
    };

    let mut last_seven_days: Vec<DayBucket> = (0..7i64)
        .rev()
        .map(|back| DayBucket {
            date: today - chrono::Duration::days(back),
            passed: 0,
            failed: 0,
        })
        .collect();
    for result in results {
        // Runs are bucketed by the local calendar date they started on.
        let date = result.started_at.with_timezone(&Local).date_naive();
        if let Some(bucket) = last_seven_days.iter_mut().find(|b| b.date == date) {
            match result.status {
                TestStatus::Passed => bucket.passed += 1,
                TestStatus::Failed => bucket.failed += 1,
                TestStatus::Running => {}
            }
        }
    }

    let by_test_type = TestType::all()
        .into_iter()
        .map(|test_type| {
            let of_type: Vec<&TestResult> =
                results.iter().filter(|r| r.test_type == test_type).collect();
            let total = of_type.len() as u64;
            let passed = of_type
                .iter()
                .filter(|r| r.status == TestStatus::Passed)
                .count() as u64;
            TypeBreakdown {
                test_type,
                total,
                passed,
                success_rate: rate(passed, total),
            }
        })
        .collect();

    TestAnalytics {
        total_runs,
        success_rate: rate(passed, total_runs),
        average_duration_ms,
        last_seven_days,
        by_test_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::Map;
    use uuid::Uuid;

    fn result(test_type: TestType, status: TestStatus, duration_ms: u64) -> TestResult {
        TestResult {
            id: Uuid::new_v4(),
            test_type,
            status,
            started_at: Utc::now(),
            finished_at: Some(Utc::now()),
            duration_ms,
            steps: Vec::new(),
            error: None,
            metadata: Map::new(),
        }
    }

    #[test]
    fn empty_results_yield_zero_rates_and_seven_buckets() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let analytics = compute(&[], today);
        assert_eq!(analytics.total_runs, 0);
        assert_eq!(analytics.success_rate, 0.0);
        assert_eq!(analytics.average_duration_ms, 0.0);
        assert_eq!(analytics.last_seven_days.len(), 7);
        assert_eq!(
            analytics.last_seven_days[0].date,
            NaiveDate::from_ymd_opt(2024, 6, 9).unwrap()
        );
        assert_eq!(analytics.last_seven_days[6].date, today);
        assert_eq!(analytics.by_test_type.len(), 5);
    }

    #[test]
    fn success_rate_and_average_duration() {
        let results = vec![
            result(TestType::Enrollment, TestStatus::Passed, 100),
            result(TestType::Enrollment, TestStatus::Failed, 300),
            result(TestType::CustomerAuth, TestStatus::Passed, 200),
            result(TestType::CustomerAuth, TestStatus::Passed, 400),
        ];
        let analytics = compute(&results, Local::now().date_naive());
        assert_eq!(analytics.total_runs, 4);
        assert_eq!(analytics.success_rate, 75.0);
        assert_eq!(analytics.average_duration_ms, 250.0);

        let enrollment = analytics
            .by_test_type
            .iter()
            .find(|b| b.test_type == TestType::Enrollment)
            .unwrap();
        assert_eq!(enrollment.total, 2);
        assert_eq!(enrollment.success_rate, 50.0);

        let refund = analytics
            .by_test_type
            .iter()
            .find(|b| b.test_type == TestType::RefundFlow)
            .unwrap();
        assert_eq!(refund.total, 0);
        assert_eq!(refund.success_rate, 0.0);
    }

    #[test]
    fn todays_runs_land_in_the_last_bucket() {
        let results = vec![
            result(TestType::Enrollment, TestStatus::Passed, 10),
            result(TestType::Enrollment, TestStatus::Failed, 10),
        ];
        let today = Local::now().date_naive();
        let analytics = compute(&results, today);
        let last = analytics.last_seven_days.last().unwrap();
        assert_eq!(last.date, today);
        assert_eq!(last.passed, 1);
        assert_eq!(last.failed, 1);
    }

    #[test]
    fn runs_older_than_seven_days_are_ignored() {
        let mut old = result(TestType::Enrollment, TestStatus::Passed, 10);
        old.started_at = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let analytics = compute(&[old], Local::now().date_naive());
        let counted: u64 = analytics
            .last_seven_days
            .iter()
            .map(|b| b.passed + b.failed)
            .sum();
        assert_eq!(counted, 0);
        // It still counts toward totals, just not the histogram.
        assert_eq!(analytics.total_runs, 1);
    }
}
