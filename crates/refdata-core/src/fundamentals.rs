//! Quarterly filings and point-in-time fundamental lookups.
//!
//! This module defines:
//!
//! - [`FilingRecord`] - one quarterly or annual financial filing
//! - [`FundamentalProperty`] - the parsed form of a downstream property name
//! - [`property_value`] - the point-in-time valuation over a filing list
//!
//! Lookups are **point-in-time**: only filings with `filing_date` on or
//! before the query date are visible, never `end_date`, so results cannot
//! leak information that had not been filed yet. Flow items over twelve
//! months sum the four most recent quarterly filings; balance-sheet (stock)
//! items take the latest observation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reporting cadence of a filing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    /// Quarterly reporting period.
    #[default]
    Quarterly,
    /// Annual reporting period.
    Annual,
}

/// One financial filing with its three statements.
///
/// Statement maps key canonical upstream field names to reported values.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FilingRecord {
    /// Uppercase ticker the filing belongs to.
    pub ticker: String,
    /// Fiscal year of the reporting period.
    pub fiscal_year: i32,
    /// Fiscal period label (e.g. "Q1").
    pub fiscal_period: String,
    /// Start of the reporting period.
    pub start_date: Option<NaiveDate>,
    /// End of the reporting period.
    pub end_date: Option<NaiveDate>,
    /// Date the filing became public. Drives point-in-time visibility.
    pub filing_date: NaiveDate,
    /// Reporting cadence.
    pub timeframe: Timeframe,
    /// Income statement fields.
    pub income: BTreeMap<String, f64>,
    /// Balance sheet fields.
    pub balance: BTreeMap<String, f64>,
    /// Cash flow statement fields.
    pub cash_flow: BTreeMap<String, f64>,
}

impl FilingRecord {
    /// Returns the statement map for `kind`.
    #[must_use]
    pub const fn statement(&self, kind: StatementKind) -> &BTreeMap<String, f64> {
        match kind {
            StatementKind::IncomeStatement => &self.income,
            StatementKind::BalanceSheet => &self.balance,
            StatementKind::CashFlowStatement => &self.cash_flow,
        }
    }
}

/// Which financial statement a field lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// Income statement.
    IncomeStatement,
    /// Balance sheet.
    BalanceSheet,
    /// Cash flow statement.
    CashFlowStatement,
}

impl StatementKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "IncomeStatement" => Some(Self::IncomeStatement),
            "BalanceSheet" => Some(Self::BalanceSheet),
            "CashFlowStatement" => Some(Self::CashFlowStatement),
            _ => None,
        }
    }

    /// Balance-sheet items are stock quantities: a trailing-twelve-months
    /// query takes the latest observation instead of a four-quarter sum.
    #[must_use]
    pub const fn is_stock_item(&self) -> bool {
        matches!(self, Self::BalanceSheet)
    }
}

/// Recognized statement fields and their canonical upstream keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum FundamentalField {
    TotalRevenue,
    CostOfRevenue,
    GrossProfit,
    OperatingIncome,
    NetIncome,
    TotalAssets,
    CurrentAssets,
    CurrentLiabilities,
    StockholdersEquity,
    TotalEquity,
    OperatingCashFlow,
    InvestingCashFlow,
    FinancingCashFlow,
    CapitalExpenditure,
    /// Computed as operating cash flow plus capital expenditure (capex is
    /// signed negative upstream, so the addition subtracts).
    FreeCashFlow,
}

impl FundamentalField {
    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "TotalRevenue" => Self::TotalRevenue,
            "CostOfRevenue" => Self::CostOfRevenue,
            "GrossProfit" => Self::GrossProfit,
            "OperatingIncome" => Self::OperatingIncome,
            "NetIncome" => Self::NetIncome,
            "TotalAssets" => Self::TotalAssets,
            "CurrentAssets" => Self::CurrentAssets,
            "CurrentLiabilities" => Self::CurrentLiabilities,
            "StockholdersEquity" => Self::StockholdersEquity,
            "TotalEquity" => Self::TotalEquity,
            "OperatingCashFlow" => Self::OperatingCashFlow,
            "InvestingCashFlow" => Self::InvestingCashFlow,
            "FinancingCashFlow" => Self::FinancingCashFlow,
            "CapitalExpenditure" => Self::CapitalExpenditure,
            "FreeCashFlow" => Self::FreeCashFlow,
            _ => return None,
        })
    }

    /// Returns the upstream field key this maps to.
    ///
    /// [`FundamentalField::FreeCashFlow`] has no direct key; it is computed
    /// from operating cash flow and capital expenditure.
    #[must_use]
    pub const fn upstream_key(&self) -> &'static str {
        match self {
            Self::TotalRevenue => "revenues",
            Self::CostOfRevenue => "cost_of_revenue",
            Self::GrossProfit => "gross_profit",
            Self::OperatingIncome => "operating_income_loss",
            Self::NetIncome => "net_income_loss",
            Self::TotalAssets => "assets",
            Self::CurrentAssets => "current_assets",
            Self::CurrentLiabilities => "current_liabilities",
            Self::StockholdersEquity => "equity_attributable_to_parent",
            Self::TotalEquity => "equity",
            Self::OperatingCashFlow => "net_cash_flow_from_operating_activities",
            Self::InvestingCashFlow => "net_cash_flow_from_investing_activities",
            Self::FinancingCashFlow => "net_cash_flow_from_financing_activities",
            Self::CapitalExpenditure | Self::FreeCashFlow => "capital_expenditure",
        }
    }
}

/// Aggregation window of a property name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ReportPeriod {
    OneMonth,
    TwoMonths,
    ThreeMonths,
    SixMonths,
    NineMonths,
    TwelveMonths,
}

impl ReportPeriod {
    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "OneMonth" => Self::OneMonth,
            "TwoMonths" => Self::TwoMonths,
            "ThreeMonths" => Self::ThreeMonths,
            "SixMonths" => Self::SixMonths,
            "NineMonths" => Self::NineMonths,
            "TwelveMonths" => Self::TwelveMonths,
            _ => return None,
        })
    }
}

/// A parsed downstream fundamental property name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FundamentalProperty {
    /// `FinancialStatements_{Statement}_{Field}_{Period}`.
    Statement {
        /// The statement the field is read from.
        statement: StatementKind,
        /// The requested field.
        field: FundamentalField,
        /// The aggregation window.
        period: ReportPeriod,
    },
    /// `CompanyProfile_MarketCap`; always NaN (not in upstream filings).
    MarketCap,
    /// `HasFundamentalData`; 1.0 when any filing is visible at the date.
    HasFundamentalData,
}

impl FundamentalProperty {
    /// Parses a property name. Unrecognized names return `None`, which the
    /// lookup layer turns into NaN, so valuation is total over all inputs.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "CompanyProfile_MarketCap" => return Some(Self::MarketCap),
            "HasFundamentalData" => return Some(Self::HasFundamentalData),
            _ => {}
        }
        let mut parts = name.split('_');
        if parts.next() != Some("FinancialStatements") {
            return None;
        }
        let statement = StatementKind::parse(parts.next()?)?;
        let field = FundamentalField::parse(parts.next()?)?;
        let period = ReportPeriod::parse(parts.next()?)?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::Statement {
            statement,
            field,
            period,
        })
    }
}

/// Number of quarterly filings summed for a trailing-twelve-months flow.
const TTM_QUARTERS: usize = 4;

/// Evaluates `property` over `filings` as of `date`.
///
/// `filings` must be sorted ascending by `filing_date` (the order the filing
/// cache maintains). Missing data of any kind yields NaN, never an error.
#[must_use]
pub fn property_value(
    filings: &[FilingRecord],
    date: NaiveDate,
    property: &FundamentalProperty,
) -> f64 {
    match property {
        FundamentalProperty::MarketCap => f64::NAN,
        FundamentalProperty::HasFundamentalData => {
            if latest_quarterly(filings, date).is_some() {
                1.0
            } else {
                0.0
            }
        }
        FundamentalProperty::Statement {
            statement,
            field,
            period,
        } => match period {
            ReportPeriod::ThreeMonths => quarterly_value(filings, date, *statement, *field),
            ReportPeriod::TwelveMonths if statement.is_stock_item() => {
                quarterly_value(filings, date, *statement, *field)
            }
            ReportPeriod::TwelveMonths => ttm_value(filings, date, *statement, *field),
            _ => f64::NAN,
        },
    }
}

/// The most recent quarterly filing visible at `date`.
fn latest_quarterly(filings: &[FilingRecord], date: NaiveDate) -> Option<&FilingRecord> {
    filings
        .iter()
        .rev()
        .find(|f| f.timeframe == Timeframe::Quarterly && f.filing_date <= date)
}

/// Reads one field out of one filing; NaN when the key is absent.
fn filing_value(filing: &FilingRecord, statement: StatementKind, field: FundamentalField) -> f64 {
    if field == FundamentalField::FreeCashFlow {
        let ocf = filing
            .cash_flow
            .get(FundamentalField::OperatingCashFlow.upstream_key());
        let capex = filing
            .cash_flow
            .get(FundamentalField::CapitalExpenditure.upstream_key());
        return match (ocf, capex) {
            (Some(ocf), Some(capex)) => ocf + capex,
            _ => f64::NAN,
        };
    }
    filing
        .statement(statement)
        .get(field.upstream_key())
        .copied()
        .unwrap_or(f64::NAN)
}

fn quarterly_value(
    filings: &[FilingRecord],
    date: NaiveDate,
    statement: StatementKind,
    field: FundamentalField,
) -> f64 {
    latest_quarterly(filings, date).map_or(f64::NAN, |f| filing_value(f, statement, field))
}

fn ttm_value(
    filings: &[FilingRecord],
    date: NaiveDate,
    statement: StatementKind,
    field: FundamentalField,
) -> f64 {
    let visible: Vec<&FilingRecord> = filings
        .iter()
        .filter(|f| f.timeframe == Timeframe::Quarterly && f.filing_date <= date)
        .collect();
    if visible.len() < TTM_QUARTERS {
        return f64::NAN;
    }
    // The four most recent; summation makes the chronological re-sort moot.
    visible[visible.len() - TTM_QUARTERS..]
        .iter()
        .map(|f| filing_value(f, statement, field))
        .sum()
}
