//! Sales time-series types

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::{Result, SalesboardError};

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Granularity used to bucket order timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFrame {
    #[default]
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl TimeFrame {
    pub const ALL: [TimeFrame; 4] = [Self::Daily, Self::Weekly, Self::Monthly, Self::Yearly];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Daily => "Daily",
            Self::Weekly => "Weekly",
            Self::Monthly => "Monthly",
            Self::Yearly => "Yearly",
        }
    }

    pub fn period_column_label(&self) -> &'static str {
        match self {
            Self::Daily => "Date",
            Self::Weekly => "Week",
            Self::Monthly => "Month",
            Self::Yearly => "Year",
        }
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        })
    }
}

impl FromStr for TimeFrame {
    type Err = SalesboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" | "d" => Ok(Self::Daily),
            "weekly" | "w" => Ok(Self::Weekly),
            "monthly" | "m" => Ok(Self::Monthly),
            "yearly" | "y" => Ok(Self::Yearly),
            other => Err(SalesboardError::Parse(format!(
                "unknown time frame '{}'",
                other
            ))),
        }
    }
}

/// Bucket identity for one period under a [`TimeFrame`].
///
/// Keys carry no year except for `Year`, so the same day, week or month
/// from different years share one bucket. Ordering is calendar order of
/// the position the key names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PeriodKey {
    Day { month: u32, day: u32 },
    Week(u32),
    Month(u32),
    Year(i32),
}

impl PeriodKey {
    pub fn for_date(date: NaiveDate, timeframe: TimeFrame) -> Self {
        match timeframe {
            TimeFrame::Daily => Self::Day {
                month: date.month(),
                day: date.day(),
            },
            TimeFrame::Weekly => Self::Week(week_of_year(date)),
            TimeFrame::Monthly => Self::Month(date.month()),
            TimeFrame::Yearly => Self::Year(date.year()),
        }
    }

    /// Display label, e.g. "Jan 5", "Week 2", "January", "2024"
    pub fn label(&self) -> String {
        match *self {
            Self::Day { month, day } => format!("{} {}", &month_name(month)[..3], day),
            Self::Week(week) => format!("Week {}", week),
            Self::Month(month) => month_name(month).to_string(),
            Self::Year(year) => year.to_string(),
        }
    }
}

fn month_name(month: u32) -> &'static str {
    MONTH_NAMES[(month.clamp(1, 12) - 1) as usize]
}

/// Week number within the date's year, counting Sunday-started weeks.
///
/// Week 1 runs from January 1st to the first Saturday; numbering restarts
/// every January 1st.
pub fn week_of_year(date: NaiveDate) -> u32 {
    let days_since_jan1 = date.ordinal0();
    let weekday = date.weekday().num_days_from_sunday();
    let jan1_weekday = (weekday + 7 - days_since_jan1 % 7) % 7;
    (days_since_jan1 + jan1_weekday + 1).div_ceil(7)
}

/// One aggregated period
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodBucket {
    pub label: String,
    pub amount: f64,
}

/// Chronologically ordered sales buckets for one time frame
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SalesSeries {
    pub timeframe: TimeFrame,
    pub buckets: Vec<PeriodBucket>,
}

impl SalesSeries {
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn labels(&self) -> Vec<String> {
        self.buckets.iter().map(|b| b.label.clone()).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.buckets.iter().map(|b| b.amount).collect()
    }

    pub fn total(&self) -> f64 {
        self.buckets.iter().map(|b| b.amount).sum()
    }

    /// Highest bucket, first one wins on ties
    pub fn peak(&self) -> Option<&PeriodBucket> {
        self.buckets.iter().fold(None, |best, b| match best {
            Some(current) if current.amount >= b.amount => Some(current),
            _ => Some(b),
        })
    }

    /// Parallel label/value arrays for charting
    pub fn chart_data(&self) -> ChartData {
        ChartData {
            timeframe: self.timeframe,
            labels: self.labels(),
            values: self.values(),
        }
    }
}

/// Presentation payload: ordered labels with matching values
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub timeframe: TimeFrame,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}
