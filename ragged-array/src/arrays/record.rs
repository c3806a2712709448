use std::sync::Arc;

use itertools::Itertools;
use ragged_dtype::Parameters;
use ragged_error::{RaggedResult, ragged_bail, ragged_err};

use crate::{
    Content, ContentRef, Identities, Index64, Item, NumpyArray, RecordItem, Reducer, SliceItem,
};

/// A struct-of-arrays: one content per field, all read at the same row number.
///
/// Without a `recordlookup` the node is a tuple and fields are named by ordinal. The
/// node's logical length is explicit and may be smaller than any field's length;
/// operations trim fields to the logical length before consuming them.
#[derive(Debug, Clone)]
pub struct RecordArray {
    pub(crate) identities: Option<Arc<Identities>>,
    pub(crate) parameters: Parameters,
    contents: Vec<ContentRef>,
    recordlookup: Option<Vec<String>>,
    length: usize,
}

impl RecordArray {
    /// A record with an explicit logical length.
    pub fn try_new(
        contents: Vec<ContentRef>,
        recordlookup: Option<Vec<String>>,
        length: usize,
    ) -> RaggedResult<Self> {
        if let Some(lookup) = &recordlookup {
            if lookup.len() != contents.len() {
                ragged_bail!(
                    "recordlookup and contents must have the same number of fields, got {} and {}",
                    lookup.len(),
                    contents.len()
                );
            }
        }
        for (i, content) in contents.iter().enumerate() {
            if content.len() < length {
                ragged_bail!(
                    "RecordArray field {i} of length {} is shorter than the record length {length}",
                    content.len()
                );
            }
        }
        Ok(Self {
            identities: None,
            parameters: Parameters::new(),
            contents,
            recordlookup,
            length,
        })
    }

    /// A record whose length is the shortest field length (zero with no fields).
    pub fn try_new_auto_length(
        contents: Vec<ContentRef>,
        recordlookup: Option<Vec<String>>,
    ) -> RaggedResult<Self> {
        let length = contents.iter().map(|c| c.len()).min().unwrap_or(0);
        Self::try_new(contents, recordlookup, length)
    }

    /// Same node with the given parameters.
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// The field contents.
    pub fn contents(&self) -> &[ContentRef] {
        &self.contents
    }

    /// The field names, if this is not a tuple.
    pub fn recordlookup(&self) -> Option<&[String]> {
        self.recordlookup.as_deref()
    }

    /// Whether fields are named by ordinal.
    pub fn is_tuple(&self) -> bool {
        self.recordlookup.is_none()
    }

    /// The logical length.
    pub fn len(&self) -> usize {
        self.length
    }

    /// Whether the record has no rows.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Number of fields.
    pub fn numfields(&self) -> usize {
        self.contents.len()
    }

    /// The ordinal of `key`, resolving tuple ordinals spelled as digits.
    pub fn fieldindex(&self, key: &str) -> RaggedResult<usize> {
        if let Some(lookup) = &self.recordlookup {
            if let Some(i) = lookup.iter().position(|k| k == key) {
                return Ok(i);
            }
        }
        if let Ok(i) = key.parse::<usize>() {
            if i < self.numfields() {
                return Ok(i);
            }
        }
        Err(ragged_err!(OutOfRange: "no field {key:?} in record with {} fields", self.numfields()))
    }

    /// The name of field `index`.
    pub fn key(&self, index: usize) -> RaggedResult<String> {
        if index >= self.numfields() {
            ragged_bail!(OutOfRange:
                "fieldindex {index} for record with only {} fields", self.numfields());
        }
        Ok(match &self.recordlookup {
            Some(lookup) => lookup[index].clone(),
            None => index.to_string(),
        })
    }

    /// Whether `key` names a field.
    pub fn haskey(&self, key: &str) -> bool {
        self.fieldindex(key).is_ok()
    }

    /// All field names, ordinals for tuples.
    pub fn keys(&self) -> Vec<String> {
        match &self.recordlookup {
            Some(lookup) => lookup.clone(),
            None => (0..self.numfields()).map(|i| i.to_string()).collect(),
        }
    }

    /// The content of field `index`, untrimmed.
    pub fn field_at(&self, index: usize) -> RaggedResult<&ContentRef> {
        if index >= self.numfields() {
            ragged_bail!(OutOfRange:
                "fieldindex {index} for record with only {} fields", self.numfields());
        }
        Ok(&self.contents[index])
    }

    /// The content of field `key`, untrimmed.
    pub fn field(&self, key: &str) -> RaggedResult<&ContentRef> {
        self.field_at(self.fieldindex(key)?)
    }

    /// `(name, content)` pairs in field order.
    pub fn field_items(&self) -> Vec<(String, ContentRef)> {
        self.keys()
            .into_iter()
            .zip(self.contents.iter().cloned())
            .collect()
    }

    /// Same record with the field names dropped.
    pub fn as_tuple(&self) -> Self {
        Self {
            identities: self.identities.clone(),
            parameters: self.parameters.clone(),
            contents: self.contents.clone(),
            recordlookup: None,
            length: self.length,
        }
    }

    /// A record with field `index` replaced (or appended when `index` is the field
    /// count); `what` must match the logical length.
    pub fn set_field_at(&self, index: usize, what: ContentRef) -> RaggedResult<Self> {
        if what.len() != self.length {
            ragged_bail!(TypeMismatch:
                "array of length {} cannot be assigned to record array of length {}",
                what.len(),
                self.length);
        }
        if index > self.numfields() {
            ragged_bail!(OutOfRange:
                "fieldindex {index} for record with only {} fields", self.numfields());
        }
        let mut contents = self.contents.clone();
        let mut recordlookup = self.recordlookup.clone();
        if index == self.numfields() {
            contents.push(what);
            if let Some(lookup) = &mut recordlookup {
                lookup.push(index.to_string());
            }
        } else {
            contents[index] = what;
        }
        Self::try_new(contents, recordlookup, self.length)
    }

    /// A record with the named field replaced or appended; names a tuple's fields by
    /// ordinal first.
    pub fn set_field(&self, key: &str, what: ContentRef) -> RaggedResult<Self> {
        if what.len() != self.length {
            ragged_bail!(TypeMismatch:
                "array of length {} cannot be assigned to record array of length {}",
                what.len(),
                self.length);
        }
        if let Ok(index) = self.fieldindex(key) {
            let mut contents = self.contents.clone();
            contents[index] = what;
            return Self::try_new(contents, self.recordlookup.clone(), self.length);
        }
        let mut contents = self.contents.clone();
        contents.push(what);
        let mut lookup = match &self.recordlookup {
            Some(lookup) => lookup.clone(),
            None => (0..self.numfields()).map(|i| i.to_string()).collect(),
        };
        lookup.push(key.to_string());
        Self::try_new(contents, Some(lookup), self.length)
    }

    pub(crate) fn item_at(&self, at: usize) -> RaggedResult<Item> {
        Ok(Item::Record(RecordItem::new(Arc::new(self.clone()), at)?))
    }

    pub(crate) fn range_nowrap(&self, start: usize, stop: usize) -> RaggedResult<Self> {
        let identities = self
            .identities
            .as_ref()
            .map(|ids| Arc::new(ids.slice(start, stop)));
        if self.contents.is_empty() {
            return Ok(Self {
                identities,
                parameters: self.parameters.clone(),
                contents: Vec::new(),
                recordlookup: self.recordlookup.clone(),
                length: stop - start,
            });
        }
        let contents = self
            .contents
            .iter()
            .map(|c| c.getitem_range_nowrap(start as i64, stop as i64))
            .collect::<RaggedResult<_>>()?;
        Ok(Self {
            identities,
            parameters: self.parameters.clone(),
            contents,
            recordlookup: self.recordlookup.clone(),
            length: stop - start,
        })
    }

    /// Fields trimmed to the logical length.
    pub(crate) fn trimmed(&self) -> RaggedResult<Self> {
        self.range_nowrap(0, self.length)
    }

    pub(crate) fn carry(&self, carry: &Index64) -> RaggedResult<Content> {
        for &c in carry.as_slice() {
            if c < 0 || c as usize >= self.length {
                ragged_bail!(OutOfRange: "carry index {c} out of range for length {}", self.length);
            }
        }
        let contents: Vec<ContentRef> =
            self.contents.iter().map(|c| c.carry(carry)).try_collect()?;
        let identities = self
            .identities
            .as_ref()
            .map(|ids| ids.carry(carry).map(Arc::new))
            .transpose()?;
        Ok(Content::Record(Self {
            identities,
            parameters: self.parameters.clone(),
            contents,
            recordlookup: self.recordlookup.clone(),
            length: carry.len(),
        }))
    }

    /// A record with every field projected to `keys`, preserving their order.
    pub fn project_fields(&self, keys: &[String]) -> RaggedResult<Self> {
        let mut contents = Vec::with_capacity(keys.len());
        let recordlookup = self.recordlookup.as_ref().map(|_| keys.to_vec());
        for key in keys {
            contents.push(
                self.field(key)?
                    .getitem_range_nowrap(0, self.length as i64)?,
            );
        }
        Ok(Self {
            identities: self.identities.clone(),
            parameters: Parameters::new(),
            contents,
            recordlookup,
            length: self.length,
        })
    }

    pub(crate) fn getitem_next_structural(
        &self,
        head: &SliceItem,
        tail: &[SliceItem],
        advanced: &Index64,
    ) -> RaggedResult<ContentRef> {
        match head {
            SliceItem::At(_) | SliceItem::Range(_) | SliceItem::Array64(_)
            | SliceItem::Jagged64(_) => {
                let contents: Vec<ContentRef> = self
                    .contents
                    .iter()
                    .map(|c| {
                        c.getitem_range_nowrap(0, self.length as i64)?
                            .getitem_next(Some(head), &[], advanced)
                    })
                    .collect::<RaggedResult<_>>()?;
                let parameters = if head.preserves_type(advanced) {
                    self.parameters.clone()
                } else {
                    Parameters::new()
                };
                let out = Self::try_new_auto_length(contents, self.recordlookup.clone())?
                    .with_parameters(parameters);
                Content::Record(out).getitem_next(tail.first(), tail.get(1..).unwrap_or(&[]), advanced)
            }
            other => Err(ragged_err!(UndefinedOperation:
                "RecordArray::getitem_next({other})")),
        }
    }

    pub(crate) fn getitem_next_jagged(
        &self,
        slicestarts: &Index64,
        slicestops: &Index64,
        slicecontent: &SliceItem,
        tail: &[SliceItem],
    ) -> RaggedResult<ContentRef> {
        if self.contents.is_empty() {
            return Ok(Content::Record(self.clone()).into());
        }
        let contents: Vec<ContentRef> = self
            .contents
            .iter()
            .map(|c| {
                c.getitem_range_nowrap(0, self.length as i64)?
                    .getitem_next_jagged(slicestarts, slicestops, slicecontent, tail)
            })
            .collect::<RaggedResult<_>>()?;
        let out = Self::try_new_auto_length(contents, self.recordlookup.clone())?
            .with_parameters(self.parameters.clone());
        Ok(Content::Record(out).into())
    }

    pub(crate) fn num(&self, axis: i64, depth: i64) -> RaggedResult<Content> {
        let contents = self
            .contents
            .iter()
            .map(|c| c.num_at(axis, depth).map(ContentRef::from))
            .collect::<RaggedResult<_>>()?;
        Ok(Content::Record(Self::try_new(
            contents,
            self.recordlookup.clone(),
            self.length,
        )?))
    }

    pub(crate) fn offsets_and_flattened(
        &self,
        axis: i64,
        depth: i64,
    ) -> RaggedResult<(Index64, Content)> {
        let toaxis = Content::Record(self.clone()).wrap_axis(axis, depth)?;
        if toaxis == depth {
            ragged_bail!(OutOfRange: "axis=0 not allowed for flatten");
        }
        if toaxis == depth + 1 {
            ragged_bail!(TypeMismatch:
                "arrays of records cannot be flattened (but their contents can be; \
                 try a different 'axis')");
        }
        let mut contents = Vec::with_capacity(self.contents.len());
        for content in &self.contents {
            let trimmed = content.getitem_range_nowrap(0, self.length as i64)?;
            let (offsets, flattened) = trimmed.offsets_and_flattened(axis, depth)?;
            if !offsets.is_empty() {
                ragged_bail!(
                    "record field with axis > depth + 1 returned non-empty offsets from flatten"
                );
            }
            contents.push(ContentRef::from(flattened));
        }
        Ok((
            Index64::empty(),
            Content::Record(Self::try_new_auto_length(
                contents,
                self.recordlookup.clone(),
            )?),
        ))
    }

    pub(crate) fn fillna(&self, value: &ContentRef) -> RaggedResult<Content> {
        let contents = self
            .contents
            .iter()
            .map(|c| c.fillna(value).map(Into::into))
            .collect::<RaggedResult<_>>()?;
        Ok(Content::Record(Self {
            identities: self.identities.clone(),
            parameters: self.parameters.clone(),
            contents,
            recordlookup: self.recordlookup.clone(),
            length: self.length,
        }))
    }

    pub(crate) fn is_none(&self, axis: i64, depth: i64) -> RaggedResult<Content> {
        let toaxis = Content::Record(self.clone()).wrap_axis(axis, depth)?;
        if toaxis == depth {
            Ok(Content::Numpy(NumpyArray::from_bools(&vec![false; self.length])))
        } else {
            let contents = self
                .contents
                .iter()
                .map(|c| c.is_none_at(axis, depth).map(ContentRef::from))
                .collect::<RaggedResult<_>>()?;
            Ok(Content::Record(Self::try_new(
                contents,
                self.recordlookup.clone(),
                self.length,
            )?))
        }
    }

    pub(crate) fn rpad(
        &self,
        target: i64,
        axis: i64,
        depth: i64,
        clip: bool,
    ) -> RaggedResult<Content> {
        let toaxis = Content::Record(self.clone()).wrap_axis(axis, depth)?;
        if toaxis == depth {
            return Content::Record(self.clone()).rpad_axis0(target, clip);
        }
        let contents: Vec<ContentRef> = self
            .contents
            .iter()
            .map(|c| c.rpad_at(target, toaxis, depth, clip).map(ContentRef::from))
            .collect::<RaggedResult<_>>()?;
        if contents.is_empty() {
            Ok(Content::Record(Self {
                identities: self.identities.clone(),
                parameters: self.parameters.clone(),
                contents,
                recordlookup: self.recordlookup.clone(),
                length: self.length,
            }))
        } else {
            let out = Self::try_new_auto_length(contents, self.recordlookup.clone())?;
            Ok(Content::Record(Self {
                identities: self.identities.clone(),
                parameters: self.parameters.clone(),
                ..out
            }))
        }
    }

    pub(crate) fn localindex(&self, axis: i64, depth: i64) -> RaggedResult<Content> {
        let contents = self
            .contents
            .iter()
            .map(|c| c.localindex_at(axis, depth).map(ContentRef::from))
            .collect::<RaggedResult<_>>()?;
        Ok(Content::Record(Self::try_new(
            contents,
            self.recordlookup.clone(),
            self.length,
        )?))
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn combinations(
        &self,
        n: usize,
        replacement: bool,
        recordlookup: Option<Vec<String>>,
        parameters: &Parameters,
        axis: i64,
        depth: i64,
    ) -> RaggedResult<Content> {
        let contents = self
            .contents
            .iter()
            .map(|c| {
                c.combinations_at(n, replacement, recordlookup.clone(), parameters, axis, depth)
                    .map(ContentRef::from)
            })
            .collect::<RaggedResult<_>>()?;
        Ok(Content::Record(Self::try_new(
            contents,
            self.recordlookup.clone(),
            self.length,
        )?))
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn reduce_next(
        &self,
        reducer: &dyn Reducer,
        negaxis: i64,
        starts: &Index64,
        parents: &Index64,
        outlength: i64,
        mask: bool,
        keepdims: bool,
    ) -> RaggedResult<Content> {
        let contents: Vec<ContentRef> = self
            .contents
            .iter()
            .map(|c| {
                let trimmed = c.getitem_range_nowrap(0, self.length as i64)?;
                trimmed
                    .reduce_next(reducer, negaxis, starts, parents, outlength, mask, keepdims)
                    .map(ContentRef::from)
            })
            .collect::<RaggedResult<_>>()?;
        Ok(Content::Record(Self::try_new(
            contents,
            self.recordlookup.clone(),
            outlength as usize,
        )?))
    }

    pub(crate) fn validity_error(&self, path: &str) -> Option<String> {
        for (i, content) in self.contents.iter().enumerate() {
            if content.len() < self.length {
                return Some(format!(
                    "at {path} (RecordArray): len(field({i})) < len(recordarray)"
                ));
            }
        }
        for (i, content) in self.contents.iter().enumerate() {
            if let Some(err) = content.validity_error(&format!("{path}.field({i})")) {
                return Some(err);
            }
        }
        None
    }

    pub(crate) fn tojson_part(
        &self,
        builder: &mut crate::JsonBuilder,
        include_beginendlist: bool,
    ) -> RaggedResult<()> {
        let keys = self.keys();
        if include_beginendlist {
            builder.begin_list();
        }
        for i in 0..self.length {
            builder.begin_record();
            for (j, content) in self.contents.iter().enumerate() {
                builder.field(&keys[j])?;
                content.getitem_at_nowrap(i as i64)?.tojson_part(builder)?;
            }
            builder.end_record()?;
        }
        if include_beginendlist {
            builder.end_list()?;
        }
        Ok(())
    }

    pub(crate) fn tostring_part(&self, indent: &str, pre: &str, post: &str) -> String {
        let mut out = format!("{indent}{pre}<RecordArray");
        if self.contents.is_empty() {
            out.push_str(&format!(" length=\"{}\"", self.length));
        }
        out.push_str(">\n");
        if let Some(ids) = &self.identities {
            out.push_str(&format!("{indent}    {ids}\n"));
        }
        for (j, content) in self.contents.iter().enumerate() {
            out.push_str(&format!("{indent}    <field index=\"{j}\""));
            if let Some(lookup) = &self.recordlookup {
                out.push_str(&format!(" key=\"{}\">", lookup[j]));
            } else {
                out.push('>');
            }
            out.push('\n');
            out.push_str(&content.tostring_part(&format!("{indent}        "), "", "\n"));
            out.push_str(&format!("{indent}    </field>\n"));
        }
        out.push_str(&format!("{indent}</RecordArray>{post}"));
        out
    }

    /// This node as a [`Content`].
    pub fn to_content(&self) -> Content {
        Content::Record(self.clone())
    }

    /// This node as a shared [`ContentRef`].
    pub fn into_ref(self) -> ContentRef {
        Arc::new(Content::Record(self))
    }
}

impl From<RecordArray> for Content {
    fn from(a: RecordArray) -> Self {
        Content::Record(a)
    }
}

#[cfg(test)]
mod test {
    use crate::{Content, NumpyArray, RecordArray};

    fn sample() -> RecordArray {
        RecordArray::try_new(
            vec![
                NumpyArray::from_vec(vec![1i64, 2]).into_ref(),
                NumpyArray::from_vec(vec![3i64, 4]).into_ref(),
            ],
            Some(vec!["a".to_string(), "b".to_string()]),
            2,
        )
        .unwrap()
    }

    #[test]
    fn field_access() {
        let rec = sample();
        assert_eq!(rec.keys(), vec!["a", "b"]);
        assert!(rec.haskey("a"));
        assert!(!rec.haskey("c"));
        assert_eq!(rec.fieldindex("b").unwrap(), 1);
        assert_eq!(rec.key(0).unwrap(), "a");
    }

    #[test]
    fn tuple_fields_by_ordinal() {
        let tup = sample().as_tuple();
        assert!(tup.is_tuple());
        assert_eq!(tup.keys(), vec!["0", "1"]);
        assert!(tup.haskey("1"));
    }

    #[test]
    fn explicit_length_trims() {
        let rec = RecordArray::try_new(
            vec![NumpyArray::from_vec(vec![1i64, 2, 3, 4]).into_ref()],
            None,
            2,
        )
        .unwrap();
        assert_eq!(rec.len(), 2);
        assert_eq!(
            rec.to_content().to_json().unwrap().to_string(),
            r#"[{"0":1},{"0":2}]"#
        );
    }

    #[test]
    fn zero_length_with_fields() {
        let rec = RecordArray::try_new(
            vec![NumpyArray::from_vec(Vec::<i64>::new()).into_ref()],
            Some(vec!["x".to_string()]),
            0,
        )
        .unwrap();
        assert_eq!(rec.len(), 0);
        assert_eq!(rec.to_content().to_json().unwrap().to_string(), "[]");
    }

    #[test]
    fn rows_resolve_fields() {
        let row = sample().item_at(1).unwrap();
        let row = row.as_record().unwrap();
        assert_eq!(row.field("a").unwrap().as_scalar().unwrap().as_i64().unwrap(), 2);
        assert_eq!(row.field("b").unwrap().as_scalar().unwrap().as_i64().unwrap(), 4);
    }

    #[test]
    fn set_field_appends() {
        let rec = sample()
            .set_field("c", NumpyArray::from_vec(vec![5i64, 6]).into_ref())
            .unwrap();
        assert_eq!(rec.keys(), vec!["a", "b", "c"]);
        let wrong_length = sample().set_field("c", NumpyArray::from_vec(vec![5i64]).into_ref());
        assert!(wrong_length.is_err());
    }

    #[test]
    fn merge_fieldwise() {
        let merged = sample()
            .to_content()
            .merge(
                &RecordArray::try_new(
                    vec![
                        NumpyArray::from_vec(vec![5i64]).into_ref(),
                        NumpyArray::from_vec(vec![6i64]).into_ref(),
                    ],
                    Some(vec!["a".to_string(), "b".to_string()]),
                    1,
                )
                .unwrap()
                .to_content(),
            )
            .unwrap();
        assert_eq!(
            merged.to_json().unwrap().to_string(),
            r#"[{"a":1,"b":3},{"a":2,"b":4},{"a":5,"b":6}]"#
        );
        let Content::Record(_) = merged else {
            panic!("expected a record");
        };
    }
}
