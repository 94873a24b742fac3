//! Inbound message matching
//!
//! Compiles an endpoint's ordered matcher list once; evaluation walks the
//! list and the first hit wins.

use axum::extract::ws::Message;
use mockd_core::model::{WsMatchRule, WsMatcher};
use mockd_core::template::Template;
use regex::Regex;
use serde_json::Value;

/// A matcher with its regex and response template pre-compiled
pub struct CompiledWsMatcher {
    rule: WsMatchRule,
    regex: Option<Regex>,
    prefix: Vec<u8>,
    pub response: Template,
}

impl CompiledWsMatcher {
    /// Compile one configured matcher
    pub fn compile(matcher: &WsMatcher) -> Self {
        let regex = match &matcher.rule {
            WsMatchRule::Regex { pattern } => Regex::new(pattern).ok(),
            _ => None,
        };
        let prefix = match &matcher.rule {
            WsMatchRule::BinaryPrefix { prefix_hex } => decode_hex(prefix_hex),
            _ => Vec::new(),
        };
        Self {
            rule: matcher.rule.clone(),
            regex,
            prefix,
            response: Template::compile(&matcher.response),
        }
    }

    /// Evaluate against an inbound frame
    pub fn matches(&self, message: &Message) -> bool {
        match (&self.rule, message) {
            (WsMatchRule::Exact { value }, Message::Text(text)) => text.as_str() == value,
            (WsMatchRule::Contains { value }, Message::Text(text)) => {
                text.as_str().contains(value.as_str())
            }
            (WsMatchRule::Regex { .. }, Message::Text(text)) => self
                .regex
                .as_ref()
                .is_some_and(|re| re.is_match(text.as_str())),
            (WsMatchRule::JsonPointer { pointer, value }, Message::Text(text)) => {
                serde_json::from_str::<Value>(text.as_str())
                    .ok()
                    .and_then(|parsed| parsed.pointer(pointer).cloned())
                    .is_some_and(|found| &found == value)
            }
            (WsMatchRule::BinaryPrefix { .. }, Message::Binary(data)) => {
                !self.prefix.is_empty() && data.starts_with(&self.prefix)
            }
            _ => false,
        }
    }
}

/// Compile a free-standing rule (scenario `receive` steps)
pub fn compile_rule(rule: &WsMatchRule) -> CompiledWsMatcher {
    CompiledWsMatcher::compile(&WsMatcher {
        rule: rule.clone(),
        response: String::new(),
    })
}

fn decode_hex(hex: &str) -> Vec<u8> {
    (0..hex.len())
        .step_by(2)
        .filter_map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Message {
        Message::Text(s.to_string().into())
    }

    fn matcher(rule: WsMatchRule) -> CompiledWsMatcher {
        CompiledWsMatcher::compile(&WsMatcher {
            rule,
            response: "resp".into(),
        })
    }

    #[test]
    fn exact_and_contains() {
        let exact = matcher(WsMatchRule::Exact {
            value: "ping".into(),
        });
        assert!(exact.matches(&text("ping")));
        assert!(!exact.matches(&text("ping!")));

        let contains = matcher(WsMatchRule::Contains {
            value: "ing".into(),
        });
        assert!(contains.matches(&text("ping")));
        assert!(!contains.matches(&text("pong")));
    }

    #[test]
    fn regex_matching() {
        let re = matcher(WsMatchRule::Regex {
            pattern: r"^cmd:\d+$".into(),
        });
        assert!(re.matches(&text("cmd:42")));
        assert!(!re.matches(&text("cmd:x")));
    }

    #[test]
    fn json_pointer_equality() {
        let rule = matcher(WsMatchRule::JsonPointer {
            pointer: "/kind".into(),
            value: serde_json::json!("subscribe"),
        });
        assert!(rule.matches(&text(r#"{"kind":"subscribe","ch":1}"#)));
        assert!(!rule.matches(&text(r#"{"kind":"other"}"#)));
        assert!(!rule.matches(&text("not json")));
    }

    #[test]
    fn binary_prefix_matching() {
        let rule = matcher(WsMatchRule::BinaryPrefix {
            prefix_hex: "cafe".into(),
        });
        assert!(rule.matches(&Message::Binary(vec![0xca, 0xfe, 0x01].into())));
        assert!(!rule.matches(&Message::Binary(vec![0x00, 0xfe].into())));
        assert!(!rule.matches(&text("cafe")));
    }
}
