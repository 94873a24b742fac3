//! Response templating
//!
//! Template strings carry `{{...}}` tokens. Each string is compiled once into
//! a segment list so per-request rendering is a single pass with no regex
//! work. Unknown tokens and missing context values render as empty strings,
//! so rendered output never contains raw `{{` delimiters.

use chrono::Utc;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rand::Rng;
use serde_json::Value;
use std::collections::HashMap;

/// Process-wide monotonic counters backing `sequence("name")`
static SEQUENCES: Lazy<Mutex<HashMap<String, u64>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Advance and return the named sequence (starts at 1)
pub fn next_sequence(name: &str) -> u64 {
    let mut map = SEQUENCES.lock();
    let counter = map.entry(name.to_string()).or_insert(0);
    *counter += 1;
    *counter
}

/// A compiled template segment
#[derive(Debug, Clone, PartialEq)]
enum Seg {
    Literal(String),
    Token(Token),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Uuid,
    Now,
    RandomInt { min: i64, max: i64 },
    RandomFloat { min: f64, max: f64, dp: u32 },
    Sequence(String),
    Faker(Faker),
    Arg(String),
    Payload(String),
    Topic,
    Param(String),
    /// `{{N}}`: MQTT `+` wildcard capture, 1-based
    Capture(usize),
    /// Anything else: looked up in the context variable map
    Var(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Faker {
    FirstName,
    LastName,
    Name,
    Email,
    Phone,
    Company,
    Url,
    Ipv4,
    Word,
    Sentence,
}

/// Context supplied at render time
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    /// Free-form variables (`{{name}}` lookups)
    pub vars: HashMap<String, String>,
    /// GraphQL arguments (`{{args.x}}`)
    pub args: Option<Value>,
    /// Inbound payload as JSON (`{{payload.x}}`)
    pub payload: Option<Value>,
    /// MQTT topic (`{{topic}}`)
    pub topic: Option<String>,
    /// Captured path params (`{{params.x}}`)
    pub params: HashMap<String, String>,
    /// MQTT `+` captures (`{{1}}`, `{{2}}`, ...)
    pub captures: Vec<String>,
}

impl RenderContext {
    /// Context with path params only (the HTTP case)
    pub fn with_params(params: HashMap<String, String>) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }
}

/// A template compiled for repeated rendering
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    segments: Vec<Seg>,
}

impl Template {
    /// Compile a template string
    pub fn compile(input: &str) -> Self {
        let mut segments = Vec::new();
        let mut rest = input;
        while let Some(start) = rest.find("{{") {
            if let Some(len) = rest[start + 2..].find("}}") {
                if start > 0 {
                    segments.push(Seg::Literal(rest[..start].to_string()));
                }
                let inner = rest[start + 2..start + 2 + len].trim();
                segments.push(Seg::Token(parse_token(inner)));
                rest = &rest[start + 2 + len + 2..];
            } else {
                // Unterminated `{{`: keep as literal
                break;
            }
        }
        if !rest.is_empty() {
            segments.push(Seg::Literal(rest.to_string()));
        }
        Self { segments }
    }

    /// True when the template has no tokens
    pub fn is_static(&self) -> bool {
        self.segments.iter().all(|s| matches!(s, Seg::Literal(_)))
    }

    /// Render with the given context; tokens are evaluated fresh each call
    pub fn render(&self, ctx: &RenderContext) -> String {
        let mut out = String::new();
        for seg in &self.segments {
            match seg {
                Seg::Literal(l) => out.push_str(l),
                Seg::Token(t) => out.push_str(&eval(t, ctx)),
            }
        }
        out
    }
}

/// Compile and render in one step
pub fn render_str(input: &str, ctx: &RenderContext) -> String {
    Template::compile(input).render(ctx)
}

/// Render every string inside a JSON value
pub fn render_value(value: &Value, ctx: &RenderContext) -> Value {
    match value {
        Value::String(s) => Value::String(render_str(s, ctx)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, ctx)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, ctx)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn parse_token(inner: &str) -> Token {
    match inner {
        "uuid" => return Token::Uuid,
        "now" | "timestamp" => return Token::Now,
        "topic" => return Token::Topic,
        _ => {}
    }
    if let Ok(n) = inner.parse::<usize>() {
        return Token::Capture(n);
    }
    if let Some(args) = call_args(inner, "random.int") {
        if let [min, max] = args.as_slice() {
            if let (Ok(min), Ok(max)) = (min.parse(), max.parse()) {
                return Token::RandomInt { min, max };
            }
        }
    }
    if let Some(args) = call_args(inner, "random.float") {
        if let [min, max, dp] = args.as_slice() {
            if let (Ok(min), Ok(max), Ok(dp)) = (min.parse(), max.parse(), dp.parse()) {
                return Token::RandomFloat { min, max, dp };
            }
        }
        if let [min, max] = args.as_slice() {
            if let (Ok(min), Ok(max)) = (min.parse(), max.parse()) {
                return Token::RandomFloat { min, max, dp: 2 };
            }
        }
    }
    if let Some(args) = call_args(inner, "sequence") {
        if let [name] = args.as_slice() {
            return Token::Sequence(unquote(name).to_string());
        }
    }
    if let Some(field) = inner.strip_prefix("faker.") {
        if let Some(kind) = faker_kind(field) {
            return Token::Faker(kind);
        }
    }
    if let Some(path) = inner.strip_prefix("args.") {
        return Token::Arg(path.to_string());
    }
    if let Some(path) = inner.strip_prefix("payload.") {
        return Token::Payload(path.to_string());
    }
    if let Some(name) = inner.strip_prefix("params.") {
        return Token::Param(name.to_string());
    }
    Token::Var(inner.to_string())
}

fn call_args<'a>(inner: &'a str, func: &str) -> Option<Vec<&'a str>> {
    let rest = inner.strip_prefix(func)?;
    let rest = rest.trim_start();
    let rest = rest.strip_prefix('(')?;
    let rest = rest.strip_suffix(')')?;
    Some(rest.split(',').map(str::trim).collect())
}

fn unquote(s: &str) -> &str {
    s.trim_matches(|c| c == '"' || c == '\'')
}

fn faker_kind(field: &str) -> Option<Faker> {
    match field {
        "firstName" => Some(Faker::FirstName),
        "lastName" => Some(Faker::LastName),
        "name" => Some(Faker::Name),
        "email" => Some(Faker::Email),
        "phone" => Some(Faker::Phone),
        "company" => Some(Faker::Company),
        "url" => Some(Faker::Url),
        "ipv4" | "ip" => Some(Faker::Ipv4),
        "word" => Some(Faker::Word),
        "sentence" => Some(Faker::Sentence),
        _ => None,
    }
}

fn eval(token: &Token, ctx: &RenderContext) -> String {
    match token {
        Token::Uuid => uuid::Uuid::new_v4().to_string(),
        Token::Now => Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        Token::RandomInt { min, max } => {
            let (lo, hi) = if min <= max { (*min, *max) } else { (*max, *min) };
            rand::rng().random_range(lo..=hi).to_string()
        }
        Token::RandomFloat { min, max, dp } => {
            let (lo, hi) = if min <= max { (*min, *max) } else { (*max, *min) };
            let n: f64 = if (hi - lo).abs() < f64::EPSILON {
                lo
            } else {
                rand::rng().random_range(lo..hi)
            };
            format!("{:.*}", *dp as usize, n)
        }
        Token::Sequence(name) => next_sequence(name).to_string(),
        Token::Faker(kind) => fake(*kind),
        Token::Arg(path) => ctx
            .args
            .as_ref()
            .and_then(|v| lookup_path(v, path))
            .map(value_to_string)
            .unwrap_or_default(),
        Token::Payload(path) => ctx
            .payload
            .as_ref()
            .and_then(|v| lookup_path(v, path))
            .map(value_to_string)
            .unwrap_or_default(),
        Token::Topic => ctx.topic.clone().unwrap_or_default(),
        Token::Param(name) => ctx.params.get(name).cloned().unwrap_or_default(),
        Token::Capture(n) => {
            if *n >= 1 {
                ctx.captures.get(*n - 1).cloned().unwrap_or_default()
            } else {
                String::new()
            }
        }
        Token::Var(name) => ctx.vars.get(name).cloned().unwrap_or_default(),
    }
}

fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for key in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(key)?,
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn fake(kind: Faker) -> String {
    const FIRSTS: &[&str] = &["Alex", "Sam", "Taylor", "Jordan", "Casey", "Riley", "Morgan", "Quinn"];
    const LASTS: &[&str] = &["Smith", "Lee", "Patel", "Garcia", "Kim", "Brown", "Okafor", "Nguyen"];
    const COMPANIES: &[&str] = &["Acme Corp", "Globex", "Initech", "Umbrella Labs", "Stark Industries"];
    const WORDS: &[&str] = &["alpha", "bravo", "cedar", "delta", "ember", "fjord", "grove", "harbor"];

    fn pick<'a>(list: &'a [&'a str]) -> &'a str {
        list[rng_index(list.len())]
    }

    let mut rng = rand::rng();
    match kind {
        Faker::FirstName => pick(FIRSTS).to_string(),
        Faker::LastName => pick(LASTS).to_string(),
        Faker::Name => format!("{} {}", pick(FIRSTS), pick(LASTS)),
        Faker::Email => {
            let user: String = (0..8)
                .map(|_| (b'a' + rng.random_range(0..26u8)) as char)
                .collect();
            format!("{user}@example.com")
        }
        Faker::Phone => format!("+1-555-{:04}", rng.random_range(0..10_000)),
        Faker::Company => pick(COMPANIES).to_string(),
        Faker::Url => format!("https://{}.example.com", pick(WORDS)),
        Faker::Ipv4 => format!(
            "{}.{}.{}.{}",
            rng.random_range(1..255u8),
            rng.random_range(0..255u8),
            rng.random_range(0..255u8),
            rng.random_range(1..255u8)
        ),
        Faker::Word => pick(WORDS).to_string(),
        Faker::Sentence => format!(
            "The {} {} reached the {}.",
            pick(WORDS),
            pick(WORDS),
            pick(WORDS)
        ),
    }
}

fn rng_index(len: usize) -> usize {
    rand::rng().random_range(0..len)
}
