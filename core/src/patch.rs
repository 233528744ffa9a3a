use crate::value::{remove_path, slot, Fields, Timestamp, Value};
use parking_lot::Mutex;

/// One write against a field path. Everything except `Set` is a sentinel
/// the backend resolves inside its single-document atomic write, so the
/// client never reads a field in order to write it back.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    Set(Value),
    /// Replaced by the backend's clock at write time.
    ServerTimestamp,
    /// Set-semantics add. Elements already present are skipped.
    ArrayUnion(Vec<Value>),
    /// Set-semantics remove. Every equal element is dropped.
    ArrayRemove(Vec<Value>),
    Increment(i64),
    Delete,
}

/// Ordered list of field writes applied as one unit to a single document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    ops: Vec<(String, FieldOp)>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: impl Into<String>, op: FieldOp) {
        self.ops.push((path.into(), op));
    }

    pub fn with(mut self, path: impl Into<String>, op: FieldOp) -> Self {
        self.push(path, op);
        self
    }

    pub fn set(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(path, FieldOp::Set(value.into()))
    }

    pub fn server_timestamp(self, path: impl Into<String>) -> Self {
        self.with(path, FieldOp::ServerTimestamp)
    }

    pub fn array_union(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(path, FieldOp::ArrayUnion(vec![value.into()]))
    }

    pub fn array_remove(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(path, FieldOp::ArrayRemove(vec![value.into()]))
    }

    pub fn increment(self, path: impl Into<String>, by: i64) -> Self {
        self.with(path, FieldOp::Increment(by))
    }

    pub fn delete(self, path: impl Into<String>) -> Self {
        self.with(path, FieldOp::Delete)
    }

    pub fn merge(mut self, other: Patch) -> Self {
        self.ops.extend(other.ops);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldOp)> {
        self.ops.iter().map(|(path, op)| (path.as_str(), op))
    }

    /// True when any op writes `path` or a field nested under it.
    pub fn touches(&self, path: &str) -> bool {
        self.ops.iter().any(|(p, _)| {
            p == path || p.strip_prefix(path).is_some_and(|rest| rest.starts_with('.'))
        })
    }

    /// Apply every op in order. `now` resolves `ServerTimestamp`.
    pub fn apply(&self, target: &mut Fields, now: Timestamp) {
        for (path, op) in &self.ops {
            match op {
                FieldOp::Set(value) => *slot(target, path) = value.clone(),
                FieldOp::ServerTimestamp => *slot(target, path) = Value::Timestamp(now),
                FieldOp::ArrayUnion(values) => {
                    let field = slot(target, path);
                    let mut items = match std::mem::replace(field, Value::Null) {
                        Value::Array(items) => items,
                        _ => Vec::new(),
                    };
                    for value in values {
                        if !items.contains(value) {
                            items.push(value.clone());
                        }
                    }
                    *field = Value::Array(items);
                }
                FieldOp::ArrayRemove(values) => {
                    let field = slot(target, path);
                    let mut items = match std::mem::replace(field, Value::Null) {
                        Value::Array(items) => items,
                        _ => Vec::new(),
                    };
                    items.retain(|item| !values.contains(item));
                    *field = Value::Array(items);
                }
                FieldOp::Increment(by) => {
                    let field = slot(target, path);
                    *field = match *field {
                        Value::Int(current) => Value::Int(current.saturating_add(*by)),
                        Value::Float(current) => Value::Float(current + *by as f64),
                        _ => Value::Int(*by),
                    };
                }
                FieldOp::Delete => {
                    remove_path(target, path);
                }
            }
        }
    }
}

impl From<Fields> for Patch {
    fn from(fields: Fields) -> Self {
        let ops = fields.into_iter().map(|(k, v)| (k, FieldOp::Set(v))).collect();
        Self { ops }
    }
}

/// Strictly increasing clock used by backends to stamp `ServerTimestamp`,
/// so two writes in the same instant still order deterministically.
#[derive(Debug, Default)]
pub struct ServerClock {
    last: Mutex<Option<Timestamp>>,
}

impl ServerClock {
    pub fn tick(&self) -> Timestamp {
        let mut last = self.last.lock();
        let mut now = Timestamp::now();
        if let Some(prev) = *last {
            if now <= prev {
                now = prev.successor();
            }
        }
        *last = Some(now);
        now
    }
}
