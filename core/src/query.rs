use crate::value::{lookup, Document, Fields, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    ArrayContains,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn matches(&self, fields: &Fields) -> bool {
        let Some(actual) = lookup(fields, &self.field) else { return false };
        match self.op {
            FilterOp::Eq => actual == &self.value,
            FilterOp::ArrayContains => actual.as_array().is_some_and(|items| items.contains(&self.value)),
            // range predicates never cross type classes
            _ if !actual.same_class(&self.value) => false,
            FilterOp::Lt => actual < &self.value,
            FilterOp::Le => actual <= &self.value,
            FilterOp::Gt => actual > &self.value,
            FilterOp::Ge => actual >= &self.value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

/// Conjunction of predicates plus an optional ordering and limit, the
/// query shape the backing store supports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter { field: field.into(), op, value: value.into() });
        self
    }

    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Eq, value)
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        if let Some((field, _)) = &self.order_by {
            // ordering on a field excludes documents that lack it
            if lookup(fields, field).is_none() {
                return false;
            }
        }
        self.filters.iter().all(|f| f.matches(fields))
    }

    /// Filter, order and truncate an unordered candidate set. Ties on the
    /// ordering field, and unordered queries, fall back to document id.
    pub fn run(&self, candidates: impl IntoIterator<Item = Document>) -> Vec<Document> {
        let mut docs: Vec<Document> = candidates.into_iter().filter(|d| self.matches(&d.fields)).collect();
        match &self.order_by {
            Some((field, direction)) => docs.sort_by(|a, b| {
                let ord = lookup(&a.fields, field).cmp(&lookup(&b.fields, field));
                let ord = match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                };
                ord.then_with(|| a.id.cmp(&b.id))
            }),
            None => docs.sort_by(|a, b| a.id.cmp(&b.id)),
        }
        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }
        docs
    }
}
