//! Message template rendering.
//!
//! Templates are identified by the `template_id` carried on the message and
//! rendered from its string-keyed parameter map. Both provider clients
//! render through here; the Meta client additionally passes the parameter
//! values positionally to the Cloud API.

use courier_common::error::AppError;

/// Render a template to its message body.
pub fn render(template_id: &str, parameters: &serde_json::Value) -> Result<String, AppError> {
    match template_id {
        "order_confirmation" => {
            let order_id = require_param(template_id, parameters, "order_id")?;
            Ok(format!(
                "Your order {order_id} has been confirmed. Thank you for your purchase!"
            ))
        }
        "shipment_dispatched" => {
            let order_id = require_param(template_id, parameters, "order_id")?;
            let tracking_id = require_param(template_id, parameters, "tracking_id")?;
            let eta = require_param(template_id, parameters, "estimated_delivery")?;
            Ok(format!(
                "Your order {order_id} has been dispatched! Track your package with tracking ID {tracking_id}. Estimated delivery: {eta}"
            ))
        }
        "delivery_eta" => {
            let order_id = require_param(template_id, parameters, "order_id")?;
            let eta = require_param(template_id, parameters, "estimated_delivery")?;
            Ok(format!(
                "Your order {order_id} is scheduled for delivery on {eta}"
            ))
        }
        "delivery_confirmation" => {
            let order_id = require_param(template_id, parameters, "order_id")?;
            Ok(format!(
                "Your order {order_id} has been delivered. Thank you for choosing our service!"
            ))
        }
        "delay_notification" => {
            let order_id = require_param(template_id, parameters, "order_id")?;
            let reason = require_param(template_id, parameters, "reason")?;
            let new_eta = require_param(template_id, parameters, "new_estimated_delivery")?;
            Ok(format!(
                "We're sorry, but your order {order_id} has been delayed due to {reason}. New estimated delivery: {new_eta}"
            ))
        }
        other => Err(AppError::Validation(format!("unknown template '{other}'"))),
    }
}

/// Parameter values in submission order, for providers that substitute
/// positionally.
pub fn parameter_values(parameters: &serde_json::Value) -> Vec<String> {
    parameters
        .as_object()
        .map(|map| map.values().map(value_to_string).collect())
        .unwrap_or_default()
}

fn require_param(
    template_id: &str,
    parameters: &serde_json::Value,
    key: &str,
) -> Result<String, AppError> {
    parameters
        .get(key)
        .filter(|v| !v.is_null())
        .map(value_to_string)
        .ok_or_else(|| {
            AppError::Validation(format!(
                "template '{template_id}' requires parameter '{key}'"
            ))
        })
}

/// Scalar JSON parameter rendered as text.
fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}
