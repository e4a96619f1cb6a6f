//! Parsed search plans: a scalar predicate tree plus one vector-search leaf.
//!
//! Plans are plain serde values. Whatever front end parses the query
//! language produces one of these; [`PlanBuilder`] is the programmatic way.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::distance::MetricType;
use crate::error::{Result, SegcoreError};
use crate::index::SearchParams;
use crate::schema::FieldId;
use crate::storage::ScalarValue;

/// Tag the placeholder group of a request must carry by default.
pub const DEFAULT_PLACEHOLDER_TAG: &str = "$0";

/// Comparison operator of a predicate leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Whether `column <op> literal` holds given `column.cmp(literal)`.
    #[inline]
    pub fn test(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

/// Boolean predicate over scalar fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// `field <op> value`.
    Compare {
        field_id: FieldId,
        op: CompareOp,
        value: ScalarValue,
    },
    /// Conjunction of comparisons on one field, e.g. `a <= field < b`.
    Range {
        field_id: FieldId,
        conditions: Vec<(CompareOp, ScalarValue)>,
    },
    /// `field IN (values...)`.
    Term {
        field_id: FieldId,
        values: Vec<ScalarValue>,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn compare<V: Into<ScalarValue>>(field_id: FieldId, op: CompareOp, value: V) -> Self {
        Expr::Compare {
            field_id,
            op,
            value: value.into(),
        }
    }

    /// Half-open range `lower <= field < upper`.
    pub fn range<V: Into<ScalarValue>>(field_id: FieldId, lower: V, upper: V) -> Self {
        Expr::Range {
            field_id,
            conditions: vec![
                (CompareOp::Ge, lower.into()),
                (CompareOp::Lt, upper.into()),
            ],
        }
    }

    pub fn term<V: Into<ScalarValue>>(field_id: FieldId, values: impl IntoIterator<Item = V>) -> Self {
        Expr::Term {
            field_id,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn and(children: Vec<Expr>) -> Self {
        Expr::And(children)
    }

    pub fn or(children: Vec<Expr>) -> Self {
        Expr::Or(children)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(child: Expr) -> Self {
        Expr::Not(Box::new(child))
    }

    /// Visit every field id referenced by the tree.
    pub fn visit_fields<F: FnMut(FieldId)>(&self, f: &mut F) {
        match self {
            Expr::Compare { field_id, .. }
            | Expr::Range { field_id, .. }
            | Expr::Term { field_id, .. } => f(*field_id),
            Expr::And(children) | Expr::Or(children) => {
                for child in children {
                    child.visit_fields(f);
                }
            }
            Expr::Not(child) => child.visit_fields(f),
        }
    }
}

/// The single vector-search leaf of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorSearchLeaf {
    pub field_id: FieldId,
    pub topk: usize,
    /// Metric the caller expects; must match the field when given.
    #[serde(default)]
    pub metric_type: Option<MetricType>,
    #[serde(default)]
    pub params: SearchParams,
    #[serde(default = "default_placeholder_tag")]
    pub placeholder_tag: String,
}

fn default_placeholder_tag() -> String {
    DEFAULT_PLACEHOLDER_TAG.to_string()
}

/// A parsed search plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub predicate: Option<Expr>,
    pub vector_search: VectorSearchLeaf,
}

impl Plan {
    /// Deserialize a plan from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let plan: Plan = serde_json::from_str(json)?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Structural checks that need no schema.
    pub fn validate(&self) -> Result<()> {
        if self.vector_search.topk == 0 {
            return Err(SegcoreError::invalid_argument("topk must be > 0"));
        }
        if self.vector_search.params.nprobe == Some(0) {
            return Err(SegcoreError::invalid_argument("nprobe must be > 0"));
        }
        Ok(())
    }
}

/// Builder for [`Plan`].
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    predicate: Option<Expr>,
    leaf: VectorSearchLeaf,
}

impl PlanBuilder {
    pub fn new(field_id: FieldId, topk: usize) -> Self {
        PlanBuilder {
            predicate: None,
            leaf: VectorSearchLeaf {
                field_id,
                topk,
                metric_type: None,
                params: SearchParams::default(),
                placeholder_tag: default_placeholder_tag(),
            },
        }
    }

    pub fn predicate(mut self, expr: Expr) -> Self {
        self.predicate = Some(expr);
        self
    }

    pub fn metric_type(mut self, metric: MetricType) -> Self {
        self.leaf.metric_type = Some(metric);
        self
    }

    pub fn nprobe(mut self, nprobe: usize) -> Self {
        self.leaf.params.nprobe = Some(nprobe);
        self
    }

    pub fn placeholder_tag<S: Into<String>>(mut self, tag: S) -> Self {
        self.leaf.placeholder_tag = tag.into();
        self
    }

    pub fn build(self) -> Result<Plan> {
        let plan = Plan {
            predicate: self.predicate,
            vector_search: self.leaf,
        };
        plan.validate()?;
        Ok(plan)
    }
}
