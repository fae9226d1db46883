use http::{HeaderMap, Method};
use serde_json::{Map, Value};

/// Transport-independent description of an inbound request
///
/// Any host layer that can fill these fields can drive the echo pipeline.
/// `body` is expected to be structurally valid already; validation belongs to
/// the host.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Request path without the query string
    pub path: String,
    /// Path and query exactly as received; absolute-form targets are reduced
    /// to this form
    pub original_url: String,
    /// Decoded query pairs in arrival order
    pub query: Vec<(String, String)>,
    pub body: Value,
    pub headers: HeaderMap,
    /// `http` or `https`
    pub protocol: String,
    /// Resolved `Host` header value
    pub host: Option<String>,
    /// Client address as resolved by the host layer
    pub client_ip: Option<String>,
    /// Remote address of the underlying socket
    pub remote_addr: Option<String>,
}

impl RequestDescriptor {
    /// A descriptor for `target` with no headers and an empty body
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = split_target(target);
        Self {
            method,
            path: path.to_string(),
            original_url: origin_form(target),
            query: query.map(parse_query).unwrap_or_default(),
            body: Value::Object(Default::default()),
            headers: HeaderMap::new(),
            protocol: "http".to_string(),
            host: None,
            client_ip: None,
            remote_addr: None,
        }
    }
}

/// Splits a request target into path and optional raw query string
///
/// Absolute-form targets (`http://host/path?q`) yield the URL's path and query.
pub fn split_target(target: &str) -> (&str, Option<&str>) {
    let without_scheme = target
        .strip_prefix("http://")
        .or_else(|| target.strip_prefix("https://"));

    let origin_form = match without_scheme {
        Some(rest) => match rest.find(['/', '?']) {
            Some(idx) => &rest[idx..],
            None => "",
        },
        None => target,
    };

    let (path, query) = match origin_form.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (origin_form, None),
    };

    if path.is_empty() { ("/", query) } else { (path, query) }
}

/// The target's path and raw query, dropping the scheme and authority of an
/// absolute-form target
pub fn origin_form(target: &str) -> String {
    match split_target(target) {
        (path, Some(query)) => format!("{path}?{query}"),
        (path, None) => path.to_string(),
    }
}

/// Decodes an `application/x-www-form-urlencoded` query string
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}

/// Bracket groups expanded per key; deeper groups stay in one literal key
const MAX_KEY_DEPTH: usize = 5;
/// Largest numeric bracket index that still produces an array
const MAX_ARRAY_INDEX: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
enum KeySegment {
    Name(String),
    /// `[]`
    Append,
}

/// Splits `a[b][]` into `a`, `b`, append
fn parse_key(key: &str) -> Vec<KeySegment> {
    let literal = || vec![KeySegment::Name(key.to_string())];
    let Some(open) = key.find('[').filter(|&open| open > 0) else {
        return literal();
    };

    let mut segments = vec![KeySegment::Name(key[..open].to_string())];
    let mut rest = &key[open..];
    while segments.len() <= MAX_KEY_DEPTH {
        let Some(inner) = rest.strip_prefix('[') else {
            break;
        };
        let Some(close) = inner.find(']') else {
            break;
        };
        let name = &inner[..close];
        if name.contains('[') {
            break;
        }
        segments.push(if name.is_empty() {
            KeySegment::Append
        } else {
            KeySegment::Name(name.to_string())
        });
        rest = &inner[close + 1..];
    }

    if segments.len() == 1 {
        return literal();
    }
    if !rest.is_empty() {
        let remainder = rest
            .strip_prefix('[')
            .and_then(|r| r.strip_suffix(']'))
            .unwrap_or(rest);
        segments.push(KeySegment::Name(remainder.to_string()));
    }
    segments
}

/// Turns `target` into an array (if needed) and appends `item`
fn append(target: &mut Value, item: Value) {
    match target {
        Value::Array(items) => items.push(item),
        Value::Null => *target = Value::Array(vec![item]),
        other => {
            let first = other.take();
            *other = Value::Array(vec![first, item]);
        }
    }
}

fn assign(target: &mut Value, segments: &[KeySegment], value: String) {
    let Some((segment, rest)) = segments.split_first() else {
        if target.is_null() {
            *target = Value::String(value);
        } else {
            append(target, Value::String(value));
        }
        return;
    };

    match segment {
        KeySegment::Name(name) => {
            if target.is_null() {
                *target = Value::Object(Map::new());
            }
            if let Value::Object(object) = target {
                let slot = object.entry(name.clone()).or_insert(Value::Null);
                assign(slot, rest, value);
            } else {
                // A scalar or array already sits here: keep both.
                let mut child = Value::Null;
                assign(&mut child, segments, value);
                append(target, child);
            }
        }
        KeySegment::Append => {
            let mut child = Value::Null;
            assign(&mut child, rest, value);
            append(target, child);
        }
    }
}

fn array_index(key: &str) -> Option<usize> {
    key.parse::<usize>()
        .ok()
        .filter(|&index| index <= MAX_ARRAY_INDEX && index.to_string() == key)
}

/// Objects keyed only by small indices (`a[0]`, `a[1]`) become arrays, in
/// index order
fn compact_indices(value: &mut Value) {
    match value {
        Value::Array(items) => items.iter_mut().for_each(compact_indices),
        Value::Object(object) => {
            object.values_mut().for_each(compact_indices);
            if object.is_empty() || !object.keys().all(|key| array_index(key).is_some()) {
                return;
            }
            let mut entries: Vec<(usize, Value)> = std::mem::take(object)
                .into_iter()
                .filter_map(|(key, item)| array_index(&key).map(|index| (index, item)))
                .collect();
            entries.sort_by_key(|(index, _)| *index);
            *value = Value::Array(entries.into_iter().map(|(_, item)| item).collect());
        }
        _ => {}
    }
}

/// Collects key/value pairs into an object
///
/// Repeated keys gather into arrays in arrival order. Bracketed keys nest:
/// `a[]=1&a[]=2` gives an array, `o[k]=v` an object and `a[0]=x` an
/// indexed array.
pub fn pairs_to_object<I>(pairs: I) -> Map<String, Value>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut root = Value::Object(Map::new());
    for (key, value) in pairs {
        assign(&mut root, &parse_key(&key), value);
    }

    let mut object = match root {
        Value::Object(object) => object,
        _ => Map::new(),
    };
    object.values_mut().for_each(compact_indices);
    object
}
