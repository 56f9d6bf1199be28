use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use loadcase_value::{Value, Variables};
use rand::Rng as _;
use serde::Deserialize;

/// How a parameter group picks its next row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Strategy {
    /// Rows are walked in order; sequential groups combine as a cartesian product.
    #[default]
    Sequential,
    /// A uniformly random row per draw.
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Count(u64),
    Unlimited,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ParametersSetting {
    /// Strategy per parameter name (the full joined name, e.g. `username-password`).
    pub strategies: BTreeMap<String, String>,

    /// Number of bindings handed out. Defaults to the number of combinations.
    pub limit: Option<LimitSetting>,
}

/// `limit` as written by the definition layer: a positive count, `-1`, or `"unlimited"`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LimitSetting {
    Count(i64),
    Keyword(String),
}

impl LimitSetting {
    fn resolve(&self) -> Result<Limit, ParameterError> {
        match self {
            Self::Count(-1) => Ok(Limit::Unlimited),
            Self::Count(n) if *n > 0 => Ok(Limit::Count(n.unsigned_abs())),
            Self::Count(n) => Err(ParameterError::InvalidLimit(n.to_string())),
            Self::Keyword(k) if k.eq_ignore_ascii_case("unlimited") => Ok(Limit::Unlimited),
            Self::Keyword(k) => Err(ParameterError::InvalidLimit(k.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParameterError {
    #[error("parameter name must not be empty")]
    EmptyName,

    #[error("parameter `{name}` has an empty column name")]
    EmptyColumn { name: String },

    #[error("column `{column}` is declared by more than one parameter")]
    DuplicateColumn { column: String },

    #[error("parameter `{name}` must be a list")]
    NotAList { name: String },

    #[error("parameter `{name}` has no values")]
    Empty { name: String },

    #[error("parameter `{name}` row {row} must be a list of {expected} values")]
    RowNotAList {
        name: String,
        row: usize,
        expected: usize,
    },

    #[error("parameter `{name}` row {row} has {got} values, expected {expected}")]
    RowArity {
        name: String,
        row: usize,
        expected: usize,
        got: usize,
    },

    #[error("parameter `{name}` has unknown strategy `{value}` (expected `sequential` or `random`)")]
    UnknownStrategy { name: String, value: String },

    #[error("strategy given for unknown parameter `{name}`")]
    StrategyForUnknownParameter { name: String },

    #[error("invalid `limit` `{0}` (expected a positive integer, -1 or `unlimited`)")]
    InvalidLimit(String),
}

#[derive(Debug)]
struct ParameterGroup {
    strategy: Strategy,
    rows: Vec<Variables>,
}

/// Shared source of variable bindings for every run of one scenario.
///
/// The cursor is a single atomic counter; each successful [`next`](Self::next) claims a
/// distinct position, so concurrent callers never observe the same sequential binding
/// while the limit holds.
#[derive(Debug)]
pub struct ParameterIterator {
    groups: Vec<ParameterGroup>,
    limit: Limit,
    sequential_combinations: u64,
    drawn: AtomicU64,
}

impl ParameterIterator {
    /// Build an iterator from the declared parameters. Returns `Ok(None)` when nothing is
    /// declared.
    pub fn from_setting(
        parameters: &BTreeMap<String, Value>,
        setting: &ParametersSetting,
    ) -> Result<Option<Self>, ParameterError> {
        for name in setting.strategies.keys() {
            if !parameters.contains_key(name) {
                return Err(ParameterError::StrategyForUnknownParameter { name: name.clone() });
            }
        }

        if parameters.is_empty() {
            return match &setting.limit {
                Some(limit) => limit.resolve().map(|_| None),
                None => Ok(None),
            };
        }

        let mut seen_columns: Vec<&str> = Vec::new();
        let mut groups = Vec::with_capacity(parameters.len());
        for (name, values) in parameters {
            let columns = split_columns(name)?;
            for column in &columns {
                if seen_columns.contains(column) {
                    return Err(ParameterError::DuplicateColumn {
                        column: (*column).to_string(),
                    });
                }
                seen_columns.push(*column);
            }

            let strategy = match setting.strategies.get(name) {
                Some(raw) => raw
                    .parse::<Strategy>()
                    .map_err(|_| ParameterError::UnknownStrategy {
                        name: name.clone(),
                        value: raw.clone(),
                    })?,
                None => Strategy::default(),
            };

            groups.push(ParameterGroup {
                strategy,
                rows: parse_rows(name, &columns, values)?,
            });
        }

        let total = groups
            .iter()
            .fold(1u64, |acc, g| acc.saturating_mul(g.rows.len() as u64));
        let limit = match &setting.limit {
            Some(limit) => limit.resolve()?,
            None => Limit::Count(total),
        };

        Ok(Some(Self::new(groups, limit)))
    }

    fn new(groups: Vec<ParameterGroup>, limit: Limit) -> Self {
        let sequential_combinations = groups
            .iter()
            .filter(|g| g.strategy == Strategy::Sequential)
            .fold(1u64, |acc, g| acc.saturating_mul(g.rows.len() as u64));

        Self {
            groups,
            limit,
            sequential_combinations,
            drawn: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn limit(&self) -> Limit {
        self.limit
    }

    /// Number of bindings handed out so far.
    #[must_use]
    pub fn drawn(&self) -> u64 {
        self.drawn.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        match self.limit {
            Limit::Unlimited => true,
            Limit::Count(limit) => self.drawn.load(Ordering::Acquire) < limit,
        }
    }

    /// Claim the next binding, or `None` once the limit is reached.
    pub fn next(&self) -> Option<Variables> {
        let position = match self.limit {
            Limit::Unlimited => self.drawn.fetch_add(1, Ordering::AcqRel),
            Limit::Count(limit) => self
                .drawn
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |d| {
                    (d < limit).then_some(d + 1)
                })
                .ok()?,
        };

        Some(self.binding_at(position))
    }

    fn binding_at(&self, position: u64) -> Variables {
        // Mixed-radix decode: the last sequential group varies fastest.
        let mut rest = position % self.sequential_combinations.max(1);
        let mut picks = vec![0usize; self.groups.len()];
        for (i, group) in self.groups.iter().enumerate().rev() {
            let len = group.rows.len() as u64;
            match group.strategy {
                Strategy::Sequential => {
                    picks[i] = (rest % len) as usize;
                    rest /= len;
                }
                Strategy::Random => {
                    picks[i] = rand::thread_rng().gen_range(0..group.rows.len());
                }
            }
        }

        let mut out = Variables::new();
        for (group, pick) in self.groups.iter().zip(picks) {
            if let Some(row) = group.rows.get(pick) {
                for (k, v) in row {
                    out.insert(k.clone(), v.clone());
                }
            }
        }
        out
    }
}

fn split_columns(name: &str) -> Result<Vec<&str>, ParameterError> {
    if name.trim().is_empty() {
        return Err(ParameterError::EmptyName);
    }

    let columns: Vec<&str> = name.split('-').map(str::trim).collect();
    if columns.iter().any(|c| c.is_empty()) {
        return Err(ParameterError::EmptyColumn {
            name: name.to_string(),
        });
    }
    Ok(columns)
}

fn parse_rows(
    name: &str,
    columns: &[&str],
    values: &Value,
) -> Result<Vec<Variables>, ParameterError> {
    let Value::Array(items) = values else {
        return Err(ParameterError::NotAList {
            name: name.to_string(),
        });
    };
    if items.is_empty() {
        return Err(ParameterError::Empty {
            name: name.to_string(),
        });
    }

    let mut rows = Vec::with_capacity(items.len());
    for (row, item) in items.iter().enumerate() {
        let mut vars = Variables::with_capacity(columns.len());
        if let [column] = columns {
            vars.insert(Arc::from(*column), item.clone());
            rows.push(vars);
            continue;
        }

        let Value::Array(cells) = item else {
            return Err(ParameterError::RowNotAList {
                name: name.to_string(),
                row,
                expected: columns.len(),
            });
        };
        if cells.len() != columns.len() {
            return Err(ParameterError::RowArity {
                name: name.to_string(),
                row,
                expected: columns.len(),
                got: cells.len(),
            });
        }
        for (column, cell) in columns.iter().zip(cells) {
            vars.insert(Arc::from(*column), cell.clone());
        }
        rows.push(vars);
    }
    Ok(rows)
}
