//! Measure definitions - aggregate, statistical, window,
//! post-aggregation window, and calculated measures.

use super::dimension::ExprResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateType {
    Count,
    CountDistinct,
    Sum,
    Avg,
    Min,
    Max,
    Number,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatisticalType {
    Stddev,
    StddevSamp,
    Variance,
    VarianceSamp,
    Median,
    P95,
    P99,
    Percentile,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatisticalConfig {
    pub use_sample: bool,
    /// Only meaningful for `StatisticalType::Percentile`. `median`/`p95`/`p99`
    /// carry their fraction implicitly (0.5/0.95/0.99).
    pub percentile: Option<f64>,
}

impl StatisticalType {
    /// The fraction passed to `buildPercentile`, resolving the config
    /// override for the generic `percentile` type.
    pub fn fraction(&self, config: Option<&StatisticalConfig>) -> Option<f64> {
        match self {
            StatisticalType::Median => Some(0.5),
            StatisticalType::P95 => Some(0.95),
            StatisticalType::P99 => Some(0.99),
            StatisticalType::Percentile => config.and_then(|c| c.percentile),
            _ => None,
        }
    }

    pub fn is_percentile(&self) -> bool {
        matches!(
            self,
            StatisticalType::Median | StatisticalType::P95 | StatisticalType::P99 | StatisticalType::Percentile
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowType {
    Lag,
    Lead,
    Rank,
    DenseRank,
    RowNumber,
    NTile,
    FirstValue,
    LastValue,
    MovingAvg,
    MovingSum,
}

#[derive(Debug, Clone, Default)]
pub struct WindowConfig {
    pub partition_by: Vec<String>,
    /// `(member, ascending)`.
    pub order_by: Vec<(String, bool)>,
    pub offset: Option<i64>,
    pub default_value: Option<crate::sql::expr::SqlExpr>,
    pub n_tile: Option<u32>,
    pub frame: Option<(Option<u32>, Option<u32>)>,
    /// Only set on post-aggregation windows: the base aggregate measure the
    /// window runs over.
    pub measure: Option<String>,
}

#[derive(Clone)]
pub enum Measure {
    Aggregate {
        agg_type: AggregateType,
        sql: ExprResolver,
        /// Row-filter closures applied via CASE-WHEN conjunction before
        /// aggregation.
        row_filters: Vec<ExprResolver>,
    },
    Statistical {
        stat_type: StatisticalType,
        sql: ExprResolver,
        config: Option<StatisticalConfig>,
    },
    Window {
        window_type: WindowType,
        sql: Option<ExprResolver>,
        config: WindowConfig,
    },
    PostAggregationWindow {
        window_type: WindowType,
        config: WindowConfig,
    },
    Calculated {
        calculated_sql: String,
    },
}

impl Measure {
    pub fn aggregate(agg_type: AggregateType, sql: ExprResolver) -> Self {
        Measure::Aggregate {
            agg_type,
            sql,
            row_filters: Vec::new(),
        }
    }

    pub fn with_row_filters(mut self, filters: Vec<ExprResolver>) -> Self {
        if let Measure::Aggregate { row_filters, .. } = &mut self {
            *row_filters = filters;
        }
        self
    }

    pub fn is_window(&self) -> bool {
        matches!(self, Measure::Window { .. })
    }

    pub fn is_post_aggregation_window(&self) -> bool {
        matches!(self, Measure::PostAggregationWindow { .. })
    }

    pub fn is_calculated(&self) -> bool {
        matches!(self, Measure::Calculated { .. })
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Measure::Aggregate { .. })
    }
}

impl std::fmt::Debug for Measure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Measure::Aggregate { agg_type, row_filters, .. } => f
                .debug_struct("Aggregate")
                .field("agg_type", agg_type)
                .field("row_filters", &row_filters.len())
                .finish(),
            Measure::Statistical { stat_type, config, .. } => f
                .debug_struct("Statistical")
                .field("stat_type", stat_type)
                .field("config", config)
                .finish(),
            Measure::Window { window_type, config, .. } => f
                .debug_struct("Window")
                .field("window_type", window_type)
                .field("config", config)
                .finish(),
            Measure::PostAggregationWindow { window_type, config } => f
                .debug_struct("PostAggregationWindow")
                .field("window_type", window_type)
                .field("config", config)
                .finish(),
            Measure::Calculated { calculated_sql } => {
                f.debug_struct("Calculated").field("calculated_sql", calculated_sql).finish()
            }
        }
    }
}
