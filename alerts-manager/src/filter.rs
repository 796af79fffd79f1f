//! Client-side post-filters for retrieved alerts

use crate::model::{value_text, Alert, AlertFilter, Condition, SYMBOL_TYPE};

/// Keep the alerts matching every present field of `filter`
///
/// Fields are applied in order: alert type, symbol, target identifier,
/// condition operand. Absent fields do not filter.
pub fn apply(alerts: Vec<Alert>, filter: &AlertFilter) -> Vec<Alert> {
    let before = alerts.len();

    let alerts: Vec<Alert> = alerts
        .into_iter()
        .filter(|alert| matches_type(alert, filter))
        .filter(|alert| matches_symbol(alert, filter))
        .filter(|alert| matches_target(alert, filter))
        .filter(|alert| matches_operand(alert, filter))
        .collect();

    tracing::trace!("Alert filter kept {} of {} alerts", alerts.len(), before);

    alerts
}

fn matches_type(alert: &Alert, filter: &AlertFilter) -> bool {
    match &filter.alert_type {
        Some(alert_type) => alert.alert_type.as_ref() == Some(alert_type),
        None => true,
    }
}

fn matches_symbol(alert: &Alert, filter: &AlertFilter) -> bool {
    match &filter.symbol {
        Some(symbol) => alert
            .conditions
            .iter()
            .any(|condition| references_symbol(condition, symbol)),
        None => true,
    }
}

fn matches_target(alert: &Alert, filter: &AlertFilter) -> bool {
    match filter.target.as_ref().and_then(|t| t.identifier.as_ref()) {
        Some(identifier) => alert
            .conditions
            .iter()
            .any(|c| c.property.target.identifier.as_ref() == Some(identifier)),
        None => true,
    }
}

fn matches_operand(alert: &Alert, filter: &AlertFilter) -> bool {
    let operand = filter
        .condition
        .as_ref()
        .and_then(|c| c.operand.as_ref())
        .and_then(value_text);

    match operand {
        Some(operand) => alert
            .conditions
            .iter()
            .any(|c| c.operator.operand_text().as_ref() == Some(&operand)),
        None => true,
    }
}

/// A symbol target with this identifier, or a symbol-typed property whose
/// operand is the literal symbol
fn references_symbol(condition: &Condition, symbol: &str) -> bool {
    let target = &condition.property.target;
    let by_target =
        target.kind.as_deref() == Some(SYMBOL_TYPE) && target.identifier.as_deref() == Some(symbol);

    let by_operand = condition.property.kind.as_deref() == Some(SYMBOL_TYPE)
        && condition.operator.operand.as_ref().and_then(|v| v.as_str()) == Some(symbol);

    by_target || by_operand
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConditionFilter, Operator, Property, Target, TargetFilter};
    use rstest::rstest;
    use serde_json::json;

    fn symbol_alert(id: &str, alert_type: &str, symbol: &str, operand: serde_json::Value) -> Alert {
        Alert::new("u1", "s1")
            .with_id(id)
            .with_type(alert_type)
            .with_condition(Condition::on_symbol(symbol, operand))
    }

    /// A condition on a symbol-typed property (e.g. "news on symbol")
    fn operand_symbol_alert(id: &str, symbol: &str) -> Alert {
        Alert::new("u1", "s1").with_id(id).with_condition(Condition::new(
            Property {
                kind: Some(SYMBOL_TYPE.to_string()),
                target: Target {
                    kind: Some("news".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            },
            Operator::with_operand(symbol),
        ))
    }

    fn fixture() -> Vec<Alert> {
        vec![
            symbol_alert("a-1", "price", "AAPL", json!("150")),
            symbol_alert("a-2", "price", "MSFT", json!(300)),
            symbol_alert("a-3", "volume", "AAPL", json!("1000000")),
            operand_symbol_alert("a-4", "AAPL"),
        ]
    }

    fn ids(alerts: &[Alert]) -> Vec<String> {
        alerts
            .iter()
            .filter_map(|a| a.alert_id.as_ref().map(ToString::to_string))
            .collect()
    }

    #[rstest]
    #[case::empty(AlertFilter::default(), vec!["a-1", "a-2", "a-3", "a-4"])]
    #[case::alert_type(
        AlertFilter { alert_type: Some("price".to_string()), ..Default::default() },
        vec!["a-1", "a-2"]
    )]
    #[case::symbol_by_target_or_operand(
        AlertFilter { symbol: Some("AAPL".to_string()), ..Default::default() },
        vec!["a-1", "a-3", "a-4"]
    )]
    #[case::type_and_symbol(
        AlertFilter {
            alert_type: Some("price".to_string()),
            symbol: Some("AAPL".to_string()),
            ..Default::default()
        },
        vec!["a-1"]
    )]
    #[case::target_identifier(
        AlertFilter {
            target: Some(TargetFilter { identifier: Some("MSFT".to_string()) }),
            ..Default::default()
        },
        vec!["a-2"]
    )]
    #[case::numeric_operand_matches_string(
        AlertFilter {
            condition: Some(ConditionFilter { operand: Some(json!(150)) }),
            ..Default::default()
        },
        vec!["a-1"]
    )]
    #[case::string_operand_matches_number(
        AlertFilter {
            condition: Some(ConditionFilter { operand: Some(json!("300")) }),
            ..Default::default()
        },
        vec!["a-2"]
    )]
    #[case::no_match(
        AlertFilter { symbol: Some("TSLA".to_string()), ..Default::default() },
        vec![]
    )]
    fn test_apply(#[case] filter: AlertFilter, #[case] expected: Vec<&str>) {
        let filtered = apply(fixture(), &filter);
        assert_eq!(ids(&filtered), expected);
    }

    #[test]
    fn test_symbol_requires_symbol_typed_target() {
        let alert = Alert::new("u1", "s1").with_id("a-5").with_condition(Condition::new(
            Property {
                target: Target {
                    kind: Some("index".to_string()),
                    identifier: Some("AAPL".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            },
            Operator::default(),
        ));

        let filter = AlertFilter {
            symbol: Some("AAPL".to_string()),
            ..Default::default()
        };

        assert!(apply(vec![alert.clone()], &filter).is_empty());

        let filter = AlertFilter {
            target: Some(TargetFilter {
                identifier: Some("AAPL".to_string()),
            }),
            ..Default::default()
        };
        assert_eq!(apply(vec![alert], &filter).len(), 1);
    }
}
