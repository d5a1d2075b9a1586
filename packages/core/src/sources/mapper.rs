//! Field mapping from provider records to canonical field names.

use serde_json::{Map, Value};

/// How one canonical field is pulled out of a raw record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    /// JSON pointer into the raw record, e.g. `/positions/0/lat`.
    Path(&'static str),
    /// Concatenation of several string/number fields, e.g. carrier + flight number.
    /// Produces nothing unless every part is present.
    Join(&'static [&'static str]),
}

/// Ordered canonical-name → rule table. Static for the adapter's lifetime.
pub type FieldMap = &'static [(&'static str, FieldRule)];

pub trait Mapper: Send + Sync {
    /// Map every raw record that passes `filter` through `field_map`, then
    /// hand each output record to `on_record` before collecting it.
    fn map(
        &self,
        records: &[Value],
        field_map: FieldMap,
        filter: Option<&dyn Fn(&Value) -> bool>,
        on_record: Option<&mut dyn FnMut(&mut Map<String, Value>)>,
    ) -> Vec<Map<String, Value>>;
}

/// Mapper that resolves rules with JSON pointers.
///
/// Fields whose source value is absent or `null` are left out of the output
/// record rather than failing the whole record.
#[derive(Debug, Default, Clone, Copy)]
pub struct PointerMapper;

impl PointerMapper {
    fn resolve(record: &Value, rule: FieldRule) -> Option<Value> {
        match rule {
            FieldRule::Path(pointer) => record.pointer(pointer).filter(|v| !v.is_null()).cloned(),
            FieldRule::Join(pointers) => {
                let mut joined = String::new();
                for pointer in pointers {
                    match record.pointer(pointer)? {
                        Value::String(s) => joined.push_str(s),
                        Value::Number(n) => joined.push_str(&n.to_string()),
                        _ => return None,
                    }
                }
                Some(Value::String(joined))
            }
        }
    }
}

impl Mapper for PointerMapper {
    fn map(
        &self,
        records: &[Value],
        field_map: FieldMap,
        filter: Option<&dyn Fn(&Value) -> bool>,
        mut on_record: Option<&mut dyn FnMut(&mut Map<String, Value>)>,
    ) -> Vec<Map<String, Value>> {
        records
            .iter()
            .filter(|record| filter.map_or(true, |keep| keep(*record)))
            .map(|record| {
                let mut out = Map::new();
                for (name, rule) in field_map {
                    if let Some(value) = Self::resolve(record, *rule) {
                        out.insert((*name).to_string(), value);
                    }
                }
                if let Some(callback) = on_record.as_deref_mut() {
                    callback(&mut out);
                }
                out
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MAP: FieldMap = &[
        ("code", FieldRule::Join(&["/carrier", "/number"])),
        ("lat", FieldRule::Path("/positions/0/lat")),
        ("name", FieldRule::Path("/name")),
    ];

    #[test]
    fn maps_paths_and_joins() {
        let records = vec![json!({
            "carrier": "QF",
            "number": 12,
            "positions": [{"lat": -33.9}],
            "name": "alpha"
        })];

        let out = PointerMapper.map(&records, MAP, None, None);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["code"], json!("QF12"));
        assert_eq!(out[0]["lat"], json!(-33.9));
        assert_eq!(out[0]["name"], json!("alpha"));
    }

    #[test]
    fn missing_fields_are_omitted() {
        let records = vec![json!({"carrier": "QF", "name": null})];
        let out = PointerMapper.map(&records, MAP, None, None);

        assert!(out[0].is_empty());
    }

    #[test]
    fn filter_runs_before_callback() {
        let records = vec![json!({"name": "keep"}), json!({"name": "drop"})];
        let keep = |v: &Value| v["name"] == "keep";
        let mut stamped = 0;
        let mut stamp = |record: &mut Map<String, Value>| {
            stamped += 1;
            record.insert("site".into(), json!("SYD"));
        };

        let out = PointerMapper.map(&records, MAP, Some(&keep), Some(&mut stamp));

        assert_eq!(out.len(), 1);
        assert_eq!(stamped, 1);
        assert_eq!(out[0]["site"], json!("SYD"));
    }
}
