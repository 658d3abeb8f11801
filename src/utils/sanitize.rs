use serde_json::Value;

/// Sanitizes sensitive fields in JSON payloads for logging
pub fn sanitize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            // provider callbacks carry values as {"Name": ..., "Value": ...} pairs
            let sensitive_item = map
                .get("Name")
                .and_then(Value::as_str)
                .map_or(false, is_sensitive_field);

            let mut sanitized = serde_json::Map::new();
            for (key, val) in map {
                let sanitized_val = if is_sensitive_field(key) || (sensitive_item && key == "Value") {
                    mask_value(val)
                } else {
                    sanitize_json(val)
                };
                sanitized.insert(key.clone(), sanitized_val);
            }
            Value::Object(sanitized)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sanitize_json).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_field(key: &str) -> bool {
    matches!(
        key.to_lowercase().as_str(),
        "phone_number"
            | "phonenumber"
            | "formatted_phone"
            | "mpesareceiptnumber"
            | "mpesa_receipt"
            | "access_token"
            | "token"
            | "api_key"
            | "secret"
            | "password"
            | "authorization"
    )
}

fn mask_value(value: &Value) -> Value {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return Value::String("****".to_string()),
    };

    if text.chars().count() > 6 {
        let visible: String = text.chars().take(2).collect();
        let end: String = text.chars().skip(text.chars().count() - 2).collect();
        Value::String(format!("{}****{}", visible, end))
    } else {
        Value::String("****".to_string())
    }
}
