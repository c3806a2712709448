use std::sync::Arc;

use ragged_dtype::PValue;
use ragged_error::{RaggedResult, ragged_bail, ragged_err};
use serde_json::Value;

use crate::{ContentRef, JsonBuilder, RecordArray};

/// The result of element access on a layout node: a scalar leaf value, a sub-array,
/// one row of a record, or a missing value.
#[derive(Debug, Clone)]
pub enum Item {
    /// A primitive leaf value.
    Scalar(PValue),
    /// A sub-array (one list element, or the result of a partial slice).
    Array(ContentRef),
    /// One row of a record array.
    Record(RecordItem),
    /// A missing value.
    Null,
}

impl Item {
    /// The scalar, if this is one.
    pub fn as_scalar(&self) -> RaggedResult<PValue> {
        match self {
            Item::Scalar(v) => Ok(*v),
            other => Err(ragged_err!(TypeMismatch: "expected a scalar, got {}", other.kind())),
        }
    }

    /// The sub-array, if this is one.
    pub fn as_array(&self) -> RaggedResult<&ContentRef> {
        match self {
            Item::Array(a) => Ok(a),
            other => Err(ragged_err!(TypeMismatch: "expected an array, got {}", other.kind())),
        }
    }

    /// The record row, if this is one.
    pub fn as_record(&self) -> RaggedResult<&RecordItem> {
        match self {
            Item::Record(r) => Ok(r),
            other => Err(ragged_err!(TypeMismatch: "expected a record, got {}", other.kind())),
        }
    }

    /// Whether this is a missing value.
    pub fn is_null(&self) -> bool {
        matches!(self, Item::Null)
    }

    fn kind(&self) -> &'static str {
        match self {
            Item::Scalar(_) => "a scalar",
            Item::Array(_) => "an array",
            Item::Record(_) => "a record",
            Item::Null => "a missing value",
        }
    }

    /// Emit this item's JSON events.
    pub fn tojson_part(&self, builder: &mut JsonBuilder) -> RaggedResult<()> {
        match self {
            Item::Null => builder.null(),
            Item::Scalar(v) => match v {
                PValue::Bool(b) => builder.boolean(*b),
                PValue::F32(f) => builder.real(*f as f64),
                PValue::F64(f) => builder.real(*f),
                PValue::U64(u) => builder.unsigned(*u),
                other => builder.integer(other.as_i64()?),
            },
            Item::Array(a) => a.tojson_part(builder, true),
            Item::Record(r) => r.tojson_part(builder),
        }
    }

    /// This item as a standalone JSON value.
    pub fn to_json(&self) -> RaggedResult<Value> {
        let mut builder = JsonBuilder::new();
        self.tojson_part(&mut builder)?;
        builder.finish()
    }
}

/// One row of a [`RecordArray`]: a lazy scalar view that resolves fields on demand.
#[derive(Debug, Clone)]
pub struct RecordItem {
    array: Arc<RecordArray>,
    at: usize,
}

impl RecordItem {
    /// View row `at` of `array`.
    pub fn new(array: Arc<RecordArray>, at: usize) -> RaggedResult<Self> {
        if at >= array.len() {
            ragged_bail!(OutOfRange: "record row {at} out of range for length {}", array.len());
        }
        Ok(Self { array, at })
    }

    /// The record array this row views.
    pub fn array(&self) -> &Arc<RecordArray> {
        &self.array
    }

    /// The row number.
    pub fn at(&self) -> usize {
        self.at
    }

    /// Whether the row comes from a tuple (fields named by ordinal).
    pub fn is_tuple(&self) -> bool {
        self.array.is_tuple()
    }

    /// The field names, ordinals for tuples.
    pub fn keys(&self) -> Vec<String> {
        self.array.keys()
    }

    /// The value of one field of this row.
    pub fn field(&self, key: &str) -> RaggedResult<Item> {
        self.array.field(key)?.getitem_at_nowrap(self.at as i64)
    }

    /// Emit this row's JSON events.
    pub fn tojson_part(&self, builder: &mut JsonBuilder) -> RaggedResult<()> {
        builder.begin_record();
        for (key, content) in self.array.field_items() {
            builder.field(&key)?;
            content.getitem_at_nowrap(self.at as i64)?.tojson_part(builder)?;
        }
        builder.end_record()
    }
}
