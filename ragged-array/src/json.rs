use ragged_error::{RaggedResult, ragged_bail};
use serde_json::{Map, Value};

/// An event-driven JSON sink: layout nodes emit begin/end and value events per element
/// and the builder assembles the `serde_json::Value`.
#[derive(Debug, Default)]
pub struct JsonBuilder {
    stack: Vec<Frame>,
    done: Option<Value>,
}

#[derive(Debug)]
enum Frame {
    List(Vec<Value>),
    Record(Map<String, Value>, Option<String>),
}

impl JsonBuilder {
    /// A builder with nothing written yet.
    pub fn new() -> Self {
        Self::default()
    }

    fn accept(&mut self, value: Value) -> RaggedResult<()> {
        match self.stack.last_mut() {
            None => {
                if self.done.is_some() {
                    ragged_bail!("json builder received a second top-level value");
                }
                self.done = Some(value);
            }
            Some(Frame::List(items)) => items.push(value),
            Some(Frame::Record(fields, key)) => match key.take() {
                Some(key) => {
                    fields.insert(key, value);
                }
                None => ragged_bail!("json builder received a record value with no field name"),
            },
        }
        Ok(())
    }

    /// Open a list.
    pub fn begin_list(&mut self) {
        self.stack.push(Frame::List(Vec::new()));
    }

    /// Close the innermost open list.
    pub fn end_list(&mut self) -> RaggedResult<()> {
        match self.stack.pop() {
            Some(Frame::List(items)) => self.accept(Value::Array(items)),
            _ => ragged_bail!("json builder has no open list to close"),
        }
    }

    /// Open a record.
    pub fn begin_record(&mut self) {
        self.stack.push(Frame::Record(Map::new(), None));
    }

    /// Name the next value written into the open record.
    pub fn field(&mut self, key: &str) -> RaggedResult<()> {
        match self.stack.last_mut() {
            Some(Frame::Record(_, slot)) => {
                *slot = Some(key.to_string());
                Ok(())
            }
            _ => ragged_bail!("json builder has no open record for a field name"),
        }
    }

    /// Close the innermost open record.
    pub fn end_record(&mut self) -> RaggedResult<()> {
        match self.stack.pop() {
            Some(Frame::Record(fields, None)) => self.accept(Value::Object(fields)),
            Some(Frame::Record(_, Some(key))) => {
                ragged_bail!("json builder record closed with dangling field {key:?}")
            }
            _ => ragged_bail!("json builder has no open record to close"),
        }
    }

    /// Write a `null`.
    pub fn null(&mut self) -> RaggedResult<()> {
        self.accept(Value::Null)
    }

    /// Write a boolean.
    pub fn boolean(&mut self, value: bool) -> RaggedResult<()> {
        self.accept(Value::Bool(value))
    }

    /// Write an integer.
    pub fn integer(&mut self, value: i64) -> RaggedResult<()> {
        self.accept(Value::Number(value.into()))
    }

    /// Write an unsigned integer.
    pub fn unsigned(&mut self, value: u64) -> RaggedResult<()> {
        self.accept(Value::Number(value.into()))
    }

    /// Write a real number; non-finite values become `null`, as JSON has no spelling
    /// for them.
    pub fn real(&mut self, value: f64) -> RaggedResult<()> {
        match serde_json::Number::from_f64(value) {
            Some(n) => self.accept(Value::Number(n)),
            None => self.accept(Value::Null),
        }
    }

    /// Write a string.
    pub fn string(&mut self, value: &str) -> RaggedResult<()> {
        self.accept(Value::String(value.to_string()))
    }

    /// Finish, returning the single completed value.
    pub fn finish(self) -> RaggedResult<Value> {
        if !self.stack.is_empty() {
            ragged_bail!("json builder finished with {} unclosed scopes", self.stack.len());
        }
        match self.done {
            Some(value) => Ok(value),
            None => ragged_bail!("json builder finished with nothing written"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn nested_events() {
        let mut b = JsonBuilder::new();
        b.begin_list();
        b.begin_record();
        b.field("x").unwrap();
        b.integer(1).unwrap();
        b.field("y").unwrap();
        b.null().unwrap();
        b.end_record().unwrap();
        b.real(2.5).unwrap();
        b.end_list().unwrap();
        assert_eq!(b.finish().unwrap().to_string(), r#"[{"x":1,"y":null},2.5]"#);
    }

    #[test]
    fn dangling_field_is_an_error() {
        let mut b = JsonBuilder::new();
        b.begin_record();
        b.field("x").unwrap();
        assert!(b.end_record().is_err());
    }

    #[test]
    fn nan_becomes_null() {
        let mut b = JsonBuilder::new();
        b.real(f64::NAN).unwrap();
        assert_eq!(b.finish().unwrap(), Value::Null);
    }
}
