use std::fmt::Write;

use chrono::NaiveDate;

use crate::alerts::BURNOUT_THRESHOLD;
use crate::models::TeamMetricsRow;

fn score(value: Option<i32>) -> String {
    value.map_or_else(|| "unknown".to_string(), |v| v.to_string())
}

/// Highest burnout risk first; teams without a risk score go last.
pub fn rank_by_risk(rows: &[TeamMetricsRow]) -> Vec<&TeamMetricsRow> {
    let mut ranked: Vec<&TeamMetricsRow> = rows.iter().collect();
    ranked.sort_by(|a, b| {
        b.record
            .burnout_risk_score
            .cmp(&a.record.burnout_risk_score)
            .then_with(|| a.team_name.cmp(&b.team_name))
    });
    ranked
}

pub fn build_report(date: NaiveDate, rows: &[TeamMetricsRow]) -> String {
    let ranked = rank_by_risk(rows);
    let mut output = String::new();

    let _ = writeln!(output, "# Team Cognitive Metrics Report");
    let _ = writeln!(output, "Metrics for {} ({} teams)", date, rows.len());
    let _ = writeln!(output);

    if ranked.is_empty() {
        let _ = writeln!(output, "No team metrics recorded for this date.");
        return output;
    }

    let at_risk = ranked
        .iter()
        .filter(|row| {
            row.record
                .burnout_risk_score
                .is_some_and(|risk| risk >= BURNOUT_THRESHOLD)
        })
        .count();
    let exposure: i64 = ranked.iter().map(|row| row.record.revenue_exposure).sum();

    let _ = writeln!(output, "## Overview");
    let _ = writeln!(
        output,
        "- Teams at or above {}% burnout risk: {}",
        BURNOUT_THRESHOLD, at_risk
    );
    let _ = writeln!(output, "- Total revenue exposure: {}", exposure);
    let _ = writeln!(output);

    let _ = writeln!(output, "## Teams by Burnout Risk");
    let _ = writeln!(
        output,
        "| Team | Risk | CCI | Readiness | Focus | Energy | Recovery | Active | Check-ins | Protocols | Exposure |"
    );
    let _ = writeln!(output, "|---|---|---|---|---|---|---|---|---|---|---|");
    for row in &ranked {
        let record = &row.record;
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {} | {} | {} | {} | {} | {} | {} |",
            row.team_name,
            score(record.burnout_risk_score),
            score(record.cognitive_capacity_index),
            score(record.avg_readiness_score),
            score(record.avg_focus_score),
            score(record.avg_energy_score),
            score(record.avg_recovery_score),
            record.active_members,
            record.check_ins_count,
            score(record.protocol_completion_rate),
            record.revenue_exposure
        );
    }

    let unknown: Vec<&str> = ranked
        .iter()
        .filter(|row| row.record.cognitive_capacity_index.is_none())
        .map(|row| row.team_name.as_str())
        .collect();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Teams Without Telemetry");

    if unknown.is_empty() {
        let _ = writeln!(output, "Every team reported telemetry in the window.");
    } else {
        for name in unknown {
            let _ = writeln!(output, "- {}", name);
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TeamMetricsRecord;
    use uuid::Uuid;

    fn row(name: &str, risk: Option<i32>, cci: Option<i32>) -> TeamMetricsRow {
        TeamMetricsRow {
            team_name: name.to_string(),
            record: TeamMetricsRecord {
                team_id: Uuid::new_v4(),
                metric_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
                avg_readiness_score: cci,
                avg_focus_score: cci,
                avg_energy_score: cci,
                avg_recovery_score: cci,
                burnout_risk_score: risk,
                cognitive_capacity_index: cci,
                active_members: 3,
                protocol_completion_rate: Some(40),
                check_ins_count: 5,
                revenue_exposure: 2500,
            },
        }
    }

    #[test]
    fn ranks_highest_risk_first_and_unknown_last() {
        let rows = vec![
            row("Quiet", None, None),
            row("Calm", Some(20), Some(80)),
            row("Strained", Some(75), Some(25)),
        ];
        let names: Vec<_> = rank_by_risk(&rows)
            .iter()
            .map(|row| row.team_name.as_str())
            .collect();
        assert_eq!(names, vec!["Strained", "Calm", "Quiet"]);
    }

    #[test]
    fn report_lists_overview_and_unknown_teams() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let rows = vec![row("Strained", Some(75), Some(25)), row("Quiet", None, None)];
        let report = build_report(date, &rows);

        assert!(report.contains("Metrics for 2026-03-02 (2 teams)"));
        assert!(report.contains("burnout risk: 1"));
        assert!(report.contains("Total revenue exposure: 5000"));
        assert!(report.contains("| Quiet | unknown | unknown |"));
        assert!(report.contains("## Teams Without Telemetry\n- Quiet"));
    }

    #[test]
    fn empty_report_says_so() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let report = build_report(date, &[]);
        assert!(report.contains("No team metrics recorded for this date."));
    }
}
