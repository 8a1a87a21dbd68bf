use serde::Serialize;

/// Ghanaian basic-education grade band: symbol 1 (best) through 9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GradeInfo {
    pub grade: u8,
    pub remark: &'static str,
}

/// Maps a percentage onto the nine-band Ghanaian scale. Lower bounds are
/// inclusive; the top and bottom bands are open-ended, so values above 100
/// resolve to grade 1 and values below 0 to grade 9.
pub fn resolve_grade(percent: f64) -> GradeInfo {
    let (grade, remark) = if percent >= 80.0 {
        (1, "Excellent")
    } else if percent >= 70.0 {
        (2, "Very Good")
    } else if percent >= 60.0 {
        (3, "Good")
    } else if percent >= 50.0 {
        (4, "Credit")
    } else if percent >= 40.0 {
        (5, "Pass")
    } else if percent >= 35.0 {
        (6, "Fail")
    } else if percent >= 30.0 {
        (7, "Fail")
    } else if percent >= 25.0 {
        (8, "Fail")
    } else {
        (9, "Fail")
    };
    GradeInfo { grade, remark }
}

/// Storage-boundary rounding. Scores are carried at full f64 precision
/// through the pipeline and rounded to the result columns' 2-decimal
/// precision only when persisted or returned.
pub fn round_to_2dp(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Serialize)]
pub struct GradingError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl GradingError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(code: &str, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: Some(details),
        }
    }
}

/// Rescales a raw score from an exam's total marks onto a configured
/// weight: `(raw / total_marks) * target_weight`.
pub fn convert_score(raw: f64, total_marks: f64, target_weight: f64) -> Result<f64, GradingError> {
    if total_marks <= 0.0 {
        return Err(GradingError::with_details(
            "invalid_exam_config",
            "exam totalMarks must be > 0",
            serde_json::json!({ "totalMarks": total_marks }),
        ));
    }
    Ok((raw / total_marks) * target_weight)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExamCategory {
    ContinuousAssessment,
    FinalExam,
}

impl ExamCategory {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "continuous_assessment" => Some(Self::ContinuousAssessment),
            "final_exam" => Some(Self::FinalExam),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ContinuousAssessment => "continuous_assessment",
            Self::FinalExam => "final_exam",
        }
    }
}

/// School- or exam-level split between continuous assessment and the final
/// exam contribution to the term total.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentageSplit {
    pub ca_percent: f64,
    pub exam_percent: f64,
}

impl PercentageSplit {
    pub fn validate(&self) -> Result<(), GradingError> {
        let sum = self.ca_percent + self.exam_percent;
        if self.ca_percent <= 0.0 || self.exam_percent <= 0.0 || (sum - 100.0).abs() > 1e-9 {
            return Err(GradingError::with_details(
                "invalid_percentage_config",
                "caPercent and examPercent must be positive and sum to 100",
                serde_json::json!({
                    "caPercent": self.ca_percent,
                    "examPercent": self.exam_percent
                }),
            ));
        }
        Ok(())
    }

    pub fn weight_for(&self, category: ExamCategory) -> f64 {
        match category {
            ExamCategory::ContinuousAssessment => self.ca_percent,
            ExamCategory::FinalExam => self.exam_percent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreStatistics {
    pub mean: f64,
    pub highest: f64,
    pub lowest: f64,
    pub count: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
}

impl ScoreStatistics {
    fn empty() -> Self {
        Self {
            mean: 0.0,
            highest: 0.0,
            lowest: 0.0,
            count: 0,
            passed: 0,
            failed: 0,
            pass_rate: 0.0,
        }
    }
}

/// Pass threshold on the percentage scale (grade 5 lower bound).
const PASS_PERCENT: f64 = 40.0;

/// Descriptive statistics over the percentage scores recorded for one exam.
/// Non-finite values are dropped; an empty set yields all-zero stats.
pub fn score_statistics<I>(scores: I) -> ScoreStatistics
where
    I: IntoIterator<Item = f64>,
{
    let valid: Vec<f64> = scores.into_iter().filter(|s| s.is_finite()).collect();
    if valid.is_empty() {
        return ScoreStatistics::empty();
    }

    let mut sum = 0.0;
    let mut highest = f64::NEG_INFINITY;
    let mut lowest = f64::INFINITY;
    let mut passed = 0;
    for &v in &valid {
        sum += v;
        highest = highest.max(v);
        lowest = lowest.min(v);
        if v >= PASS_PERCENT {
            passed += 1;
        }
    }

    let count = valid.len();
    let failed = count - passed;
    ScoreStatistics {
        mean: round_to_2dp(sum / count as f64),
        highest,
        lowest,
        count,
        passed,
        failed,
        pass_rate: round_to_2dp(100.0 * passed as f64 / count as f64),
    }
}

/// Standard competition ranking: 1-based, rank = 1 + number of strictly
/// greater scores, so equal scores share a rank. Depends only on values,
/// never on input order.
pub fn competition_rank<I>(score: f64, all_scores: I) -> usize
where
    I: IntoIterator<Item = f64>,
{
    1 + all_scores.into_iter().filter(|&s| s > score).count()
}

/// "1st", "2nd", "3rd", "11th", "21st", ...
pub fn ordinal(n: usize) -> String {
    let suffix = if n % 100 / 10 == 1 {
        "th"
    } else {
        match n % 10 {
            1 => "st",
            2 => "nd",
            3 => "rd",
            _ => "th",
        }
    };
    format!("{}{}", n, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_bands_inclusive_lower_bounds() {
        assert_eq!(resolve_grade(100.0).grade, 1);
        assert_eq!(resolve_grade(80.0).grade, 1);
        assert_eq!(resolve_grade(79.999).grade, 2);
        assert_eq!(resolve_grade(70.0).grade, 2);
        assert_eq!(resolve_grade(60.0).grade, 3);
        assert_eq!(resolve_grade(50.0).grade, 4);
        assert_eq!(resolve_grade(40.0).grade, 5);
        assert_eq!(resolve_grade(35.0).grade, 6);
        assert_eq!(resolve_grade(30.0).grade, 7);
        assert_eq!(resolve_grade(25.0).grade, 8);
        assert_eq!(resolve_grade(24.999).grade, 9);
        assert_eq!(resolve_grade(0.0).grade, 9);
    }

    #[test]
    fn grade_bands_open_ended_at_extremes() {
        assert_eq!(resolve_grade(104.5).grade, 1);
        assert_eq!(resolve_grade(-3.0).grade, 9);
    }

    #[test]
    fn grade_remarks() {
        assert_eq!(resolve_grade(85.0).remark, "Excellent");
        assert_eq!(resolve_grade(45.0).remark, "Pass");
        assert_eq!(resolve_grade(37.0).remark, "Fail");
        assert_eq!(resolve_grade(10.0).remark, "Fail");
    }

    #[test]
    fn convert_score_is_linear() {
        assert_eq!(convert_score(0.0, 50.0, 30.0).unwrap(), 0.0);
        assert_eq!(convert_score(50.0, 50.0, 30.0).unwrap(), 30.0);
        assert_eq!(convert_score(35.0, 50.0, 30.0).unwrap(), 21.0);
        let y = convert_score(68.0, 100.0, 70.0).unwrap();
        assert!((y - 47.6).abs() < 1e-9);
    }

    #[test]
    fn convert_score_rejects_non_positive_total() {
        let e = convert_score(10.0, 0.0, 30.0).unwrap_err();
        assert_eq!(e.code, "invalid_exam_config");
        assert!(convert_score(10.0, -5.0, 30.0).is_err());
    }

    #[test]
    fn percentage_split_validation() {
        assert!(PercentageSplit {
            ca_percent: 30.0,
            exam_percent: 70.0
        }
        .validate()
        .is_ok());
        assert!(PercentageSplit {
            ca_percent: 40.0,
            exam_percent: 70.0
        }
        .validate()
        .is_err());
        assert!(PercentageSplit {
            ca_percent: 0.0,
            exam_percent: 100.0
        }
        .validate()
        .is_err());
    }

    #[test]
    fn statistics_empty_input_yields_zeros() {
        let s = score_statistics([]);
        assert_eq!(s.count, 0);
        assert_eq!(s.mean, 0.0);
        assert_eq!(s.pass_rate, 0.0);
    }

    #[test]
    fn statistics_counts_pass_fail_at_40() {
        let s = score_statistics([80.0, 40.0, 39.5, 10.0]);
        assert_eq!(s.count, 4);
        assert_eq!(s.passed, 2);
        assert_eq!(s.failed, 2);
        assert_eq!(s.pass_rate, 50.0);
        assert_eq!(s.highest, 80.0);
        assert_eq!(s.lowest, 10.0);
        assert!((s.mean - 42.38).abs() < 1e-9);
    }

    #[test]
    fn statistics_drop_non_finite_values() {
        let s = score_statistics([50.0, f64::NAN, 70.0]);
        assert_eq!(s.count, 2);
        assert_eq!(s.mean, 60.0);
    }

    #[test]
    fn rank_is_order_independent_and_shares_ties() {
        let a = [55.0, 90.0, 72.0, 72.0, 31.0];
        let b = [31.0, 72.0, 90.0, 55.0, 72.0];
        assert_eq!(competition_rank(90.0, a), 1);
        assert_eq!(competition_rank(90.0, b), 1);
        assert_eq!(competition_rank(72.0, a), 2);
        assert_eq!(competition_rank(72.0, b), 2);
        assert_eq!(competition_rank(55.0, a), 4);
        assert_eq!(competition_rank(31.0, a), 5);
    }

    #[test]
    fn ordinal_suffixes() {
        assert_eq!(ordinal(1), "1st");
        assert_eq!(ordinal(2), "2nd");
        assert_eq!(ordinal(3), "3rd");
        assert_eq!(ordinal(4), "4th");
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(12), "12th");
        assert_eq!(ordinal(13), "13th");
        assert_eq!(ordinal(21), "21st");
        assert_eq!(ordinal(112), "112th");
    }

    #[test]
    fn round_to_2dp_storage_boundary() {
        assert_eq!(round_to_2dp(47.599999999), 47.6);
        assert_eq!(round_to_2dp(3.14159), 3.14);
        assert_eq!(round_to_2dp(0.0), 0.0);
    }
}
