use log::kv::{Error as KvError, Key, Value, VisitSource};
use serde_json::{Map, Number, Value as JsonValue};
use std::io::Write;

struct JsonFields<'a>(&'a mut Map<String, JsonValue>);

impl<'kvs> VisitSource<'kvs> for JsonFields<'_> {
    fn visit_pair(&mut self, key: Key<'kvs>, value: Value<'kvs>) -> Result<(), KvError> {
        self.0.insert(key.as_str().to_string(), to_json(&value));
        Ok(())
    }
}

/// Numbers and booleans keep their JSON type; everything else is rendered as a string.
fn to_json(value: &Value<'_>) -> JsonValue {
    if let Some(b) = value.to_bool() {
        JsonValue::Bool(b)
    } else if let Some(n) = value.to_u64() {
        JsonValue::from(n)
    } else if let Some(n) = value.to_i64() {
        JsonValue::from(n)
    } else if let Some(n) = value.to_f64().and_then(Number::from_f64) {
        JsonValue::Number(n)
    } else {
        JsonValue::String(value.to_string())
    }
}

/// Renders a log record as a single JSON object, including its key-values.
pub fn record_to_json(app_name: &str, record: &log::Record<'_>) -> JsonValue {
    let mut fields = Map::new();
    fields.insert(
        "time".to_string(),
        JsonValue::String(chrono::Utc::now().to_rfc3339()),
    );
    fields.insert(
        "level".to_string(),
        JsonValue::String(record.level().to_string()),
    );
    fields.insert(
        "target".to_string(),
        JsonValue::String(record.target().to_string()),
    );
    fields.insert(
        "message".to_string(),
        JsonValue::String(record.args().to_string()),
    );
    fields.insert("app".to_string(), JsonValue::String(app_name.to_string()));
    if let Err(e) = record.key_values().visit(&mut JsonFields(&mut fields)) {
        fields.insert("kv_error".to_string(), JsonValue::String(e.to_string()));
    }
    JsonValue::Object(fields)
}

pub fn init(app_name: &str) {
    let app_name = app_name.to_string();
    env_logger::Builder::from_env(env_logger::Env::new().default_filter_or("info"))
        .format(move |buf, record| writeln!(buf, "{}", record_to_json(&app_name, record)))
        .init();
}
