//! Parameter bag: named configuration values and `%name%` placeholder resolution.

use indexmap::IndexMap;

use crate::error::{DiError, DiResult};
use crate::value::Value;

/// Holds scalar, list and map configuration values and resolves `%name%`
/// placeholders between them.
///
/// - A value that is exactly one placeholder (`"%port%"`) resolves to the
///   referenced value with its native type.
/// - Placeholders embedded in a larger string always produce a string.
/// - `%%` is an escaped literal `%`; it is never a placeholder boundary and is
///   unescaped exactly once, at the end of [`ParameterBag::resolve_all`].
///
/// # Examples
///
/// ```rust
/// use di_compiler::{ParameterBag, Value};
///
/// let mut bag = ParameterBag::new();
/// bag.set("host", "localhost");
/// bag.set("port", 5432);
/// bag.set("dsn", "pgsql://%host%:%port%/app?ratio=50%%");
/// bag.set("db_port", "%port%");
///
/// let resolved = bag.resolve_all().unwrap();
/// assert_eq!(resolved.get("dsn").unwrap(), &Value::from("pgsql://localhost:5432/app?ratio=50%"));
/// assert_eq!(resolved.get("db_port").unwrap(), &Value::Int(5432));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterBag {
    parameters: IndexMap<String, Value>,
    resolved: bool,
}

impl ParameterBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a parameter. Names are case-sensitive.
    ///
    /// Setting a value on a resolved bag makes it unresolved again.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.parameters.insert(name.into(), value.into());
        self.resolved = false;
    }

    /// Adds every pair from `parameters`, overriding existing names.
    pub fn add<I, K, V>(&mut self, parameters: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (name, value) in parameters {
            self.set(name, value);
        }
    }

    pub fn get(&self, name: &str) -> DiResult<&Value> {
        self.parameters.get(name).ok_or_else(|| DiError::ParameterNotFound {
            name: name.to_string(),
            suggestion: self.suggest(name),
        })
    }

    pub fn has(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.parameters.shift_remove(name)
    }

    pub fn all(&self) -> &IndexMap<String, Value> {
        &self.parameters
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Resolves every placeholder in the bag and unescapes `%%`.
    ///
    /// Resolving an already resolved bag returns an identical bag.
    pub fn resolve_all(&self) -> DiResult<ParameterBag> {
        if self.resolved {
            return Ok(self.clone());
        }

        let mut resolved = IndexMap::with_capacity(self.parameters.len());
        for (name, value) in &self.parameters {
            let mut resolving = vec![name.clone()];
            let value = self.resolve_value_inner(value, &mut resolving)?;
            resolved.insert(name.clone(), value);
        }

        Ok(ParameterBag {
            parameters: resolved.into_iter().map(|(k, v)| (k, unescape_value(v))).collect(),
            resolved: true,
        })
    }

    /// Replaces placeholders inside `value` with parameter values.
    ///
    /// `%%` escapes are kept; callers unescape once with
    /// [`ParameterBag::unescape_value`] after all resolution is done.
    pub fn resolve_value(&self, value: &Value) -> DiResult<Value> {
        self.resolve_value_inner(value, &mut Vec::new())
    }

    /// Turns `%%` into `%` in every string (and map key) of `value`.
    pub fn unescape_value(value: Value) -> Value {
        unescape_value(value)
    }

    fn resolve_value_inner(&self, value: &Value, resolving: &mut Vec<String>) -> DiResult<Value> {
        match value {
            Value::String(s) => self.resolve_string(s, resolving),
            Value::List(items) => items
                .iter()
                .map(|item| self.resolve_value_inner(item, resolving))
                .collect::<DiResult<Vec<_>>>()
                .map(Value::List),
            Value::Map(map) => {
                let mut out = IndexMap::with_capacity(map.len());
                for (key, item) in map {
                    let key = match self.resolve_string(key, resolving)? {
                        Value::String(s) => s,
                        other => other.to_embedded_string().ok_or_else(|| DiError::InvalidParameterValue {
                            name: key.clone(),
                            message: format!("a map key cannot resolve to a value of type \"{}\"", other.type_name()),
                        })?,
                    };
                    out.insert(key, self.resolve_value_inner(item, resolving)?);
                }
                Ok(Value::Map(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn resolve_string(&self, s: &str, resolving: &mut Vec<String>) -> DiResult<Value> {
        // A lone placeholder keeps the native type of the referenced value.
        if let Some(name) = exact_placeholder(s) {
            return self.resolve_parameter(name, resolving);
        }

        let mut out = String::with_capacity(s.len());
        let mut rest = s;
        while let Some(pos) = rest.find('%') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            if tail.starts_with("%%") {
                out.push_str("%%");
                rest = &tail[2..];
                continue;
            }
            match placeholder_at(tail) {
                Some(name) => {
                    let value = self.resolve_parameter(name, resolving)?;
                    let text = value.to_embedded_string().ok_or_else(|| DiError::InvalidParameterValue {
                        name: name.to_string(),
                        message: format!(
                            "a string value must be composed of strings and/or numbers, but found parameter \"{}\" of type \"{}\" inside string value \"{}\"",
                            name,
                            value.type_name(),
                            s
                        ),
                    })?;
                    out.push_str(&text);
                    rest = &tail[name.len() + 2..];
                }
                None => {
                    out.push('%');
                    rest = &tail[1..];
                }
            }
        }
        out.push_str(rest);
        Ok(Value::String(out))
    }

    fn resolve_parameter(&self, name: &str, resolving: &mut Vec<String>) -> DiResult<Value> {
        if let Some(start) = resolving.iter().position(|n| n == name) {
            return Err(DiError::ParameterCircularReference {
                chain: resolving[start..].to_vec(),
            });
        }
        let raw = self.get(name)?;
        if self.resolved {
            return Ok(raw.clone());
        }
        resolving.push(name.to_string());
        let value = self.resolve_value_inner(raw, resolving);
        resolving.pop();
        value
    }

    fn suggest(&self, name: &str) -> Option<String> {
        let lowered = name.to_lowercase();
        self.parameters
            .keys()
            .filter_map(|candidate| {
                let distance = levenshtein(&lowered, &candidate.to_lowercase());
                let close = distance <= name.len() / 3 || candidate.contains(name);
                close.then_some((distance, candidate))
            })
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, candidate)| candidate.clone())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ParameterBag {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut bag = ParameterBag::new();
        bag.add(iter);
        bag
    }
}

/// `Some(name)` when `s` is exactly `%name%`.
fn exact_placeholder(s: &str) -> Option<&str> {
    let name = s.strip_prefix('%')?.strip_suffix('%')?;
    is_parameter_name(name).then_some(name)
}

/// `Some(name)` when `tail` starts with `%name%`.
fn placeholder_at(tail: &str) -> Option<&str> {
    let body = &tail[1..];
    let end = body.find(|c: char| c == '%' || c.is_whitespace())?;
    let name = &body[..end];
    (body[end..].starts_with('%') && !name.is_empty()).then_some(name)
}

fn is_parameter_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(|c: char| c == '%' || c.is_whitespace())
}

fn unescape_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.replace("%%", "%")),
        Value::List(items) => Value::List(items.into_iter().map(unescape_value).collect()),
        Value::Map(map) => Value::Map(
            map.into_iter()
                .map(|(k, v)| (k.replace("%%", "%"), unescape_value(v)))
                .collect(),
        ),
        other => other,
    }
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut cur = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            cur[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        prev = cur;
    }
    prev[b.len()]
}
